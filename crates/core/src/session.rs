//! Temporary session credentials from STS

use crate::client::StoreClient;
use crate::error::{Error, Result};
use crate::listing::to_utc;
use crate::sanitize::mask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// Allowed lifetimes, in seconds
const SESSION_TOKEN_DURATION: RangeInclusive<i32> = 900..=129_600;
const ASSUME_ROLE_DURATION: RangeInclusive<i32> = 900..=43_200;

pub const DEFAULT_DURATION_SECS: i32 = 3600;

/// What to ask STS for
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Assume this role instead of requesting a plain session token
    pub role_arn: Option<String>,
    pub session_name: Option<String>,
    pub duration_secs: i32,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self {
            role_arn: None,
            session_name: None,
            duration_secs: DEFAULT_DURATION_SECS,
        }
    }
}

impl SessionRequest {
    pub fn validate(&self) -> Result<()> {
        let range = if self.role_arn.is_some() {
            ASSUME_ROLE_DURATION
        } else {
            SESSION_TOKEN_DURATION
        };
        if !range.contains(&self.duration_secs) {
            return Err(Error::Usage(format!(
                "session duration must be between {} and {} seconds, got {}",
                range.start(),
                range.end(),
                self.duration_secs
            )));
        }
        Ok(())
    }

    fn session_name(&self) -> String {
        self.session_name
            .clone()
            .unwrap_or_else(|| format!("cloudstore-{}", uuid::Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

// Never print the secret parts, even in debug logs
impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &mask(&self.secret_access_key))
            .field("session_token", &mask(&self.session_token))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl SessionCredentials {
    /// Shell `export` lines for the standard AWS environment variables
    pub fn export_lines(&self) -> Vec<String> {
        vec![
            format!("export AWS_ACCESS_KEY_ID={}", self.access_key_id),
            format!("export AWS_SECRET_ACCESS_KEY={}", self.secret_access_key),
            format!("export AWS_SESSION_TOKEN={}", self.session_token),
        ]
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Request temporary credentials with the client's identity
pub async fn fetch_session_credentials(
    client: &StoreClient,
    request: &SessionRequest,
) -> Result<SessionCredentials> {
    request.validate()?;
    let sts = aws_sdk_sts::Client::new(client.sdk_config());

    let credentials = match &request.role_arn {
        Some(role_arn) => {
            let session_name = request.session_name();
            debug!(role_arn = %role_arn, session_name = %session_name, "assuming role");
            sts.assume_role()
                .role_arn(role_arn)
                .role_session_name(session_name)
                .duration_seconds(request.duration_secs)
                .send()
                .await?
                .credentials
        }
        None => {
            debug!(duration = request.duration_secs, "requesting session token");
            sts.get_session_token()
                .duration_seconds(request.duration_secs)
                .send()
                .await?
                .credentials
        }
    };

    let credentials = credentials.ok_or_else(|| Error::Other("STS returned no credentials".to_string()))?;
    let session = SessionCredentials {
        access_key_id: credentials.access_key_id().to_string(),
        secret_access_key: credentials.secret_access_key().to_string(),
        session_token: credentials.session_token().to_string(),
        expiration: to_utc(Some(credentials.expiration())),
    };
    info!(access_key_id = %session.access_key_id, expiration = ?session.expiration, "session credentials issued");
    Ok(session)
}
