//! IAM policy generation for a bucket path

use crate::uri::StorePath;
use serde::{Deserialize, Serialize};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub sid: String,
    pub effect: String,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

impl Statement {
    fn allow(sid: &str, actions: &[&str], resources: Vec<String>) -> Self {
        Self {
            sid: sid.to_string(),
            effect: "Allow".to_string(),
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource: resources,
        }
    }
}

/// Which permissions to grant
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyOptions {
    pub read_only: bool,
    pub no_multipart: bool,
}

/// Build the policy the tools need on `path`
pub fn build_policy(path: &StorePath, options: PolicyOptions) -> PolicyDocument {
    let bucket_arn = format!("arn:aws:s3:::{}", path.bucket);
    let objects_arn = format!("{}/{}*", bucket_arn, path.prefix());

    let mut statement = vec![
        Statement::allow(
            "BucketAccess",
            &[
                "s3:ListBucket",
                "s3:ListBucketVersions",
                "s3:ListBucketMultipartUploads",
                "s3:GetBucketLocation",
            ],
            vec![bucket_arn],
        ),
        Statement::allow(
            "ObjectRead",
            &["s3:GetObject", "s3:GetObjectVersion"],
            vec![objects_arn.clone()],
        ),
    ];

    if !options.read_only {
        statement.push(Statement::allow(
            "ObjectWrite",
            &["s3:PutObject", "s3:DeleteObject", "s3:DeleteObjectVersion"],
            vec![objects_arn.clone()],
        ));
        if !options.no_multipart {
            statement.push(Statement::allow(
                "MultipartUploads",
                &["s3:AbortMultipartUpload", "s3:ListMultipartUploadParts"],
                vec![objects_arn],
            ));
        }
    }

    PolicyDocument {
        version: POLICY_VERSION.to_string(),
        statement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_policy() {
        let path = StorePath::parse("s3://data/tables").unwrap();
        let policy = build_policy(&path, PolicyOptions::default());
        assert_eq!(policy.statement.len(), 4);
        assert_eq!(policy.statement[0].resource, vec!["arn:aws:s3:::data"]);
        assert_eq!(policy.statement[1].resource, vec!["arn:aws:s3:::data/tables/*"]);
        assert!(policy.statement[2].action.contains(&"s3:DeleteObjectVersion".to_string()));
    }

    #[test]
    fn test_read_only_policy() {
        let path = StorePath::parse("s3://data/").unwrap();
        let policy = build_policy(
            &path,
            PolicyOptions {
                read_only: true,
                no_multipart: false,
            },
        );
        assert_eq!(policy.statement.len(), 2);
        assert_eq!(policy.statement[1].resource, vec!["arn:aws:s3:::data/*"]);
    }

    #[test]
    fn test_json_field_names() {
        let path = StorePath::parse("s3://b/p").unwrap();
        let json = serde_json::to_value(build_policy(
            &path,
            PolicyOptions {
                read_only: false,
                no_multipart: true,
            },
        ))
        .unwrap();
        assert_eq!(json["Version"], "2012-10-17");
        assert_eq!(json["Statement"].as_array().unwrap().len(), 3);
        assert_eq!(json["Statement"][0]["Effect"], "Allow");
    }
}
