//! cloudstore-core - Core library for the cloudstore CLI
//!
//! Store maintenance and diagnostics over S3-compatible object stores:
//! paginated listings, batched bulk deletes, parallel uploads, capability
//! probing and the configuration and error model shared by every command.

pub mod bulk;
pub mod capability;
pub mod client;
pub mod cloudup;
pub mod config;
pub mod duration;
pub mod error;
pub mod listing;
pub mod output;
pub mod paging;
pub mod policy;
pub mod sanitize;
pub mod session;
pub mod uri;
pub mod versions;

// Re-export commonly used types
pub use bulk::{parse_key_list, BulkDeleter, DeleteBatcher, DeleteCandidate, DeleteSummary, DryRunDeleter, S3Deleter};
pub use capability::{ApiLevel, Capability, CapabilityProbe, CapabilityStatus, StoreProbe};
pub use client::{requires_multipart_upload, MultipartUploadConfig, StoreClient};
pub use cloudup::{plan_uploads, run_uploads, run_uploads_until, scan_directory, CloudUpOptions, S3Transfer, UploadReport};
pub use config::{config_exists, get_config_path, load_config, save_config, validate_config};
pub use config::{AdvancedConfig, ConfigFile, LoggingConfig, OutputConfig, StoreConfig};
pub use duration::DurationInfo;
pub use error::{Error, ErrorKind, Result};
pub use listing::{MultipartListing, ObjectListing, PartListing, VersionListing};
pub use output::{format_bytes, CsvOutput, Output};
pub use paging::{ListingPage, PageSource, PagedListing};
pub use uri::StorePath;
