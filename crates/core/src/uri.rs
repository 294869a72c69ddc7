//! Store path parsing

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

const SCHEMES: &[&str] = &["s3://", "s3a://"];

/// A bucket plus an object key or key prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    pub bucket: String,
    pub key: String,
}

impl StorePath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `s3://bucket/key` or `s3a://bucket/key`
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = SCHEMES
            .iter()
            .find_map(|scheme| uri.strip_prefix(scheme))
            .ok_or_else(|| {
                Error::InvalidPath(format!("{} (expected s3://bucket/path or s3a://bucket/path)", uri))
            })?;

        let (bucket, key) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, ""),
        };

        if bucket.is_empty() {
            return Err(Error::InvalidPath(format!("{} has no bucket", uri)));
        }

        Ok(Self::new(bucket, key))
    }

    /// True for the bucket root
    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// The key as a listing prefix: empty at the root, otherwise ending in `/`
    pub fn prefix(&self) -> String {
        if self.key.is_empty() || self.key.ends_with('/') {
            self.key.clone()
        } else {
            format!("{}/", self.key)
        }
    }

    /// Resolve a relative key beneath this path
    pub fn child(&self, relative: &str) -> StorePath {
        let relative = relative.trim_start_matches('/');
        StorePath::new(&self.bucket, format!("{}{}", self.prefix(), relative))
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for StorePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StorePath::parse(s)
    }
}

/// A zero-byte object whose key ends in `/`, standing in for an empty directory
pub fn is_directory_marker(key: &str) -> bool {
    key.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let path = StorePath::parse("s3://bucket/dir/file.txt").unwrap();
        assert_eq!(path.bucket, "bucket");
        assert_eq!(path.key, "dir/file.txt");

        let path = StorePath::parse("s3a://bucket").unwrap();
        assert_eq!(path.bucket, "bucket");
        assert!(path.is_root());
    }

    #[test]
    fn test_parse_rejects() {
        assert!(StorePath::parse("hdfs://bucket/x").is_err());
        assert!(StorePath::parse("s3:///key").is_err());
        assert!(StorePath::parse("bucket/key").is_err());
    }

    #[test]
    fn test_prefix() {
        assert_eq!(StorePath::parse("s3://b/").unwrap().prefix(), "");
        assert_eq!(StorePath::parse("s3://b/dir").unwrap().prefix(), "dir/");
        assert_eq!(StorePath::parse("s3://b/dir/").unwrap().prefix(), "dir/");
    }

    #[test]
    fn test_child_and_display() {
        let base = StorePath::parse("s3://b/data").unwrap();
        let child = base.child("/part-0000");
        assert_eq!(child.key, "data/part-0000");
        assert_eq!(child.to_string(), "s3://b/data/part-0000");
    }

    #[test]
    fn test_directory_marker() {
        assert!(is_directory_marker("dir/"));
        assert!(!is_directory_marker("dir/file"));
    }
}
