//! Store capability negotiation.
//!
//! Capabilities are a closed enum, each tagged with the API level that
//! introduced it. A probe declares the level it speaks; asking it about a
//! newer capability answers `Unsupported` without touching the network.

use crate::client::StoreClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::fmt;
use std::str::FromStr;

/// API level negotiated with the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApiLevel {
    V1,
    V2,
}

impl ApiLevel {
    /// Level implied by the configured list API version
    pub fn from_list_version(version: u8) -> Result<Self> {
        match version {
            1 => Ok(ApiLevel::V1),
            2 => Ok(ApiLevel::V2),
            other => Err(Error::UnsupportedVersion(format!("list version {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ListV2,
    BulkDelete,
    Versioning,
    MultipartUpload,
    ConditionalWrite,
    PathStyle,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ListV2,
        Capability::BulkDelete,
        Capability::Versioning,
        Capability::MultipartUpload,
        Capability::ConditionalWrite,
        Capability::PathStyle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::ListV2 => "list-v2",
            Capability::BulkDelete => "bulk-delete",
            Capability::Versioning => "versioning",
            Capability::MultipartUpload => "multipart-upload",
            Capability::ConditionalWrite => "conditional-write",
            Capability::PathStyle => "path-style",
        }
    }

    /// Lowest API level at which the capability exists
    pub fn min_level(&self) -> ApiLevel {
        match self {
            Capability::ListV2 | Capability::ConditionalWrite => ApiLevel::V2,
            _ => ApiLevel::V1,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<&str> = Capability::ALL.iter().map(|c| c.name()).collect();
                Error::Usage(format!("unknown capability '{}'; known: {}", s, known.join(", ")))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    Supported,
    Unsupported,
    /// The probe could not decide
    Unknown(String),
}

impl CapabilityStatus {
    pub fn is_supported(&self) -> bool {
        matches!(self, CapabilityStatus::Supported)
    }
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityStatus::Supported => f.write_str("supported"),
            CapabilityStatus::Unsupported => f.write_str("unsupported"),
            CapabilityStatus::Unknown(reason) => write!(f, "unknown ({})", reason),
        }
    }
}

/// Something that can answer capability questions about a bucket
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    fn api_level(&self) -> ApiLevel;

    /// Answer for a capability the probe's level knows about
    async fn probe_supported(&self, bucket: &str, capability: Capability) -> Result<CapabilityStatus>;

    /// Check the level first, then ask the store
    async fn probe(&self, bucket: &str, capability: Capability) -> Result<CapabilityStatus> {
        if capability.min_level() > self.api_level() {
            return Ok(CapabilityStatus::Unsupported);
        }
        self.probe_supported(bucket, capability).await
    }
}

/// Probe every known capability concurrently, in `Capability::ALL` order
pub async fn probe_all<P: CapabilityProbe + ?Sized>(
    probe: &P,
    bucket: &str,
) -> Vec<(Capability, Result<CapabilityStatus>)> {
    let results = join_all(Capability::ALL.iter().map(|c| probe.probe(bucket, *c))).await;
    Capability::ALL.into_iter().zip(results).collect()
}

/// Probe backed by a live store connection
pub struct StoreProbe {
    client: StoreClient,
    level: ApiLevel,
    path_style: bool,
}

impl StoreProbe {
    pub fn new(client: &StoreClient, path_style: bool) -> Result<Self> {
        Ok(Self {
            client: client.clone(),
            level: ApiLevel::from_list_version(client.list_version())?,
            path_style,
        })
    }
}

#[async_trait]
impl CapabilityProbe for StoreProbe {
    fn api_level(&self) -> ApiLevel {
        self.level
    }

    async fn probe_supported(&self, bucket: &str, capability: Capability) -> Result<CapabilityStatus> {
        let status = match capability {
            Capability::ListV2 | Capability::BulkDelete | Capability::MultipartUpload => CapabilityStatus::Supported,
            Capability::PathStyle => {
                if self.path_style {
                    CapabilityStatus::Supported
                } else {
                    CapabilityStatus::Unsupported
                }
            }
            Capability::Versioning => match self.client.bucket_versioning(bucket).await {
                Ok(Some(status)) if status == "Enabled" => CapabilityStatus::Supported,
                Ok(_) => CapabilityStatus::Unsupported,
                // Third-party stores often reject the versioning API outright
                Err(Error::Unimplemented(_)) => CapabilityStatus::Unsupported,
                Err(Error::PermissionDenied(m)) => CapabilityStatus::Unknown(m),
                Err(e) => return Err(e),
            },
            Capability::ConditionalWrite => {
                if self.client.endpoint().is_none() {
                    CapabilityStatus::Supported
                } else {
                    CapabilityStatus::Unknown("third-party endpoint".to_string())
                }
            }
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        level: ApiLevel,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CapabilityProbe for CountingProbe {
        fn api_level(&self) -> ApiLevel {
            self.level
        }

        async fn probe_supported(&self, _bucket: &str, _capability: Capability) -> Result<CapabilityStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CapabilityStatus::Supported)
        }
    }

    #[test]
    fn test_parse_names() {
        for capability in Capability::ALL {
            assert_eq!(capability.name().parse::<Capability>().unwrap(), capability);
        }
        assert_eq!("BULK-DELETE".parse::<Capability>().unwrap(), Capability::BulkDelete);

        let err = "append".parse::<Capability>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
        assert!(err.to_string().contains("bulk-delete"));
    }

    #[tokio::test]
    async fn test_level_gates_probe() {
        let probe = CountingProbe {
            level: ApiLevel::V1,
            calls: AtomicUsize::new(0),
        };
        let status = probe.probe("bucket", Capability::ListV2).await.unwrap();
        assert_eq!(status, CapabilityStatus::Unsupported);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        let status = probe.probe("bucket", Capability::BulkDelete).await.unwrap();
        assert!(status.is_supported());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_all_keeps_order() {
        let probe = CountingProbe {
            level: ApiLevel::V1,
            calls: AtomicUsize::new(0),
        };
        let results = probe_all(&probe, "bucket").await;
        assert_eq!(results.len(), Capability::ALL.len());
        assert_eq!(results[0].0, Capability::ListV2);
        assert_eq!(results[0].1.as_ref().unwrap(), &CapabilityStatus::Unsupported);
        // ListV2 and ConditionalWrite are gated by the level
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_api_level_from_list_version() {
        assert_eq!(ApiLevel::from_list_version(1).unwrap(), ApiLevel::V1);
        assert_eq!(ApiLevel::from_list_version(2).unwrap(), ApiLevel::V2);
        assert_eq!(
            ApiLevel::from_list_version(9).unwrap_err().kind(),
            crate::error::ErrorKind::UnsupportedVersion
        );
    }
}
