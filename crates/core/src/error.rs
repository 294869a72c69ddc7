//! Error types and exit codes for cloudstore-core

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cloudstore-core
pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of failure kinds shared by every command.
///
/// Each kind maps to one process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad arguments or unparseable input
    Usage,
    /// Credentials rejected or access denied
    NoAccess,
    /// Bucket, object, upload or file missing
    NotFound,
    /// Any other failure
    ExceptionThrown,
    /// The store does not implement an operation
    Unimplemented,
    /// Throttled or unavailable service
    ServiceUnavailable,
    /// Configured API version not supported
    UnsupportedVersion,
}

impl ErrorKind {
    pub const SUCCESS: u8 = 0;

    /// Process exit code for this kind
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::NoAccess => 41,
            ErrorKind::Usage => 42,
            ErrorKind::NotFound => 44,
            ErrorKind::ExceptionThrown => 50,
            ErrorKind::Unimplemented => 51,
            ErrorKind::ServiceUnavailable => 53,
            ErrorKind::UnsupportedVersion => 57,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Usage => "usage",
            ErrorKind::NoAccess => "no access",
            ErrorKind::NotFound => "not found",
            ErrorKind::ExceptionThrown => "exception thrown",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::ServiceUnavailable => "service unavailable",
            ErrorKind::UnsupportedVersion => "unsupported version",
        };
        f.write_str(name)
    }
}

/// Main error type for cloudstore-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Explicitly requested configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidConfig(String),

    /// Bad command arguments
    #[error("{0}")]
    Usage(String),

    /// Path is not an s3:// or s3a:// URI
    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    /// Store operation errors not otherwise classified
    #[error("Store operation failed: {0}")]
    StoreOperation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Throttling or service outage
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The store rejected the operation as not implemented
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Unsupported API version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    /// A listing was advanced past its final page
    #[error("No more elements in listing")]
    NoMoreElements,

    /// A bulk delete request reported failures
    #[error("Bulk delete failed for {failed} of {attempted} entries; first failure: {first}")]
    BulkDelete {
        attempted: usize,
        failed: usize,
        first: String,
        all_access_denied: bool,
    },

    /// Upload of a single file failed
    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV output error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Timeout
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled by user
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify this error into the shared exit-code taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Usage(_) | Error::InvalidPath(_) | Error::InvalidConfig(_) | Error::Config(_) => {
                ErrorKind::Usage
            }
            Error::ConfigNotFound(_) | Error::NotFound(_) => ErrorKind::NotFound,
            Error::PermissionDenied(_) => ErrorKind::NoAccess,
            Error::ServiceUnavailable(_) | Error::Timeout => ErrorKind::ServiceUnavailable,
            Error::Unimplemented(_) => ErrorKind::Unimplemented,
            Error::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            Error::BulkDelete {
                all_access_denied: true,
                ..
            } => ErrorKind::NoAccess,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::NoAccess,
                _ => ErrorKind::ExceptionThrown,
            },
            _ => ErrorKind::ExceptionThrown,
        }
    }

    /// Whether a listing fetch that failed with this error may be attempted once more
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ServiceUnavailable(_) | Error::Timeout | Error::StoreOperation(_)
        )
    }
}

/// Map a service error code and HTTP status onto an error variant
pub fn classify_service_error(code: Option<&str>, status: Option<u16>, message: String) -> Error {
    match code {
        Some("NoSuchBucket" | "NoSuchKey" | "NoSuchUpload" | "NoSuchVersion" | "NotFound") => {
            return Error::NotFound(message)
        }
        Some(
            "AccessDenied"
            | "InvalidAccessKeyId"
            | "SignatureDoesNotMatch"
            | "ExpiredToken"
            | "InvalidToken"
            | "AllAccessDisabled",
        ) => return Error::PermissionDenied(message),
        Some("ServiceUnavailable" | "SlowDown" | "Throttling" | "RequestTimeout") => {
            return Error::ServiceUnavailable(message)
        }
        Some("NotImplemented") => return Error::Unimplemented(message),
        _ => {}
    }

    match status {
        Some(404) => Error::NotFound(message),
        Some(401) | Some(403) => Error::PermissionDenied(message),
        Some(501) => Error::Unimplemented(message),
        Some(503) => Error::ServiceUnavailable(message),
        _ => Error::StoreOperation(message),
    }
}

// Generic SdkError conversion for all S3 and STS operations
impl<E> From<SdkError<E>> for Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    fn from(err: SdkError<E>) -> Self {
        let status = err.raw_response().map(|r| r.status().as_u16());
        let code = err.code().map(str::to_owned);
        let message = match &err {
            SdkError::TimeoutError(_) => return Error::Timeout,
            SdkError::ServiceError(_) => match err.message() {
                Some(m) => format!("{}: {}", code.as_deref().unwrap_or("ServiceError"), m),
                None => DisplayErrorContext(&err).to_string(),
            },
            _ => DisplayErrorContext(&err).to_string(),
        };
        classify_service_error(code.as_deref(), status, message)
    }
}

// ByteStreamError conversion
impl From<aws_sdk_s3::primitives::ByteStreamError> for Error {
    fn from(err: aws_sdk_s3::primitives::ByteStreamError) -> Self {
        Error::StoreOperation(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::Cancelled
        } else {
            Error::Other(format!("worker task failed: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ErrorKind::Usage.exit_code(), 42);
        assert_eq!(ErrorKind::NoAccess.exit_code(), 41);
        assert_eq!(ErrorKind::NotFound.exit_code(), 44);
        assert_eq!(ErrorKind::ExceptionThrown.exit_code(), 50);
        assert_eq!(ErrorKind::Unimplemented.exit_code(), 51);
        assert_eq!(ErrorKind::ServiceUnavailable.exit_code(), 53);
        assert_eq!(ErrorKind::UnsupportedVersion.exit_code(), 57);
    }

    #[test]
    fn test_classify_by_code() {
        let err = classify_service_error(Some("NoSuchBucket"), Some(404), "gone".into());
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = classify_service_error(Some("AccessDenied"), Some(403), "no".into());
        assert_eq!(err.kind(), ErrorKind::NoAccess);

        let err = classify_service_error(Some("SlowDown"), Some(503), "slow".into());
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert!(err.is_retryable());

        let err = classify_service_error(Some("NotImplemented"), None, "nope".into());
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
    }

    #[test]
    fn test_classify_by_status_without_code() {
        // HEAD requests carry no error body
        let err = classify_service_error(None, Some(404), "head".into());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());

        let err = classify_service_error(None, Some(403), "head".into());
        assert_eq!(err.kind(), ErrorKind::NoAccess);

        let err = classify_service_error(None, Some(500), "boom".into());
        assert_eq!(err.kind(), ErrorKind::ExceptionThrown);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_bulk_delete_kind() {
        let err = Error::BulkDelete {
            attempted: 10,
            failed: 2,
            first: "a: AccessDenied".into(),
            all_access_denied: true,
        };
        assert_eq!(err.kind(), ErrorKind::NoAccess);

        let err = Error::BulkDelete {
            attempted: 10,
            failed: 2,
            first: "a: InternalError".into(),
            all_access_denied: false,
        };
        assert_eq!(err.kind(), ErrorKind::ExceptionThrown);
    }

    #[test]
    fn test_io_not_found_kind() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(Error::NoMoreElements.kind(), ErrorKind::ExceptionThrown);
    }
}
