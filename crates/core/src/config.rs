//! Configuration management for cloudstore

use crate::error::{Error, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration directory name
const CONFIG_DIR: &str = "cloudstore";

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Largest number of keys S3 accepts in one list or bulk delete request
pub const MAX_PAGE_SIZE: usize = 1000;

/// Smallest multipart part S3 accepts, in MB
pub const MIN_MULTIPART_CHUNK_MB: usize = 5;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Custom endpoint for S3-compatible stores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Named profile in ~/.aws/config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    // Static credentials, otherwise the default provider chain is used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    #[serde(default)]
    pub path_style: bool,

    /// ListObjects API version: 1 or 2
    #[serde(default = "default_list_version")]
    pub list_version: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: None,
            profile: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            path_style: false,
            list_version: default_list_version(),
        }
    }
}

impl StoreConfig {
    /// True when both halves of a static key pair are configured
    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

/// Advanced configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Connect timeout in seconds. Requests themselves are not time-limited
    /// so large multipart parts can finish on slow links.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    #[serde(default = "default_delete_page_size")]
    pub delete_page_size: usize,
    #[serde(default = "default_upload_threads")]
    pub upload_threads: usize,
    /// Number of largest files cloudup submits first
    #[serde(default = "default_upload_largest")]
    pub upload_largest: usize,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_mb: usize,
    #[serde(default = "default_multipart_chunk_size")]
    pub multipart_chunk_size_mb: usize,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout: default_timeout(),
            list_page_size: default_list_page_size(),
            delete_page_size: default_delete_page_size(),
            upload_threads: default_upload_threads(),
            upload_largest: default_upload_largest(),
            multipart_threshold_mb: default_multipart_threshold(),
            multipart_chunk_size_mb: default_multipart_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
        }
    }
}

// Default values
fn default_list_version() -> u8 {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout() -> u64 {
    30
}

fn default_list_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_delete_page_size() -> usize {
    500
}

fn default_upload_threads() -> usize {
    8
}

fn default_upload_largest() -> usize {
    4
}

fn default_multipart_threshold() -> usize {
    64
}

fn default_multipart_chunk_size() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_separator() -> String {
    "\t".to_string()
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let home = home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
    Ok(home.join(".config").join(CONFIG_DIR))
}

/// Get the default configuration file path
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

/// Resolve the file to load: the explicit path if given, else the default location
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => get_config_path(),
    }
}

/// Load configuration.
///
/// An explicit path must exist. A missing default file yields the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile> {
    let config_path = resolve_config_path(explicit)?;

    if !config_path.exists() {
        if explicit.is_some() {
            return Err(Error::ConfigNotFound(config_path));
        }
        tracing::debug!(path = %config_path.display(), "no configuration file, using defaults");
        return Ok(ConfigFile::default());
    }

    load_config_from(&config_path)
}

/// Load and validate configuration from a specific file
pub fn load_config_from(config_path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(config_path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to read config file {}: {}", config_path.display(), e))
    })?;

    let config: ConfigFile = toml::from_str(&content).map_err(|e| {
        Error::InvalidConfig(format!("Failed to parse config file {}: {}", config_path.display(), e))
    })?;

    validate_config(&config)?;
    tracing::debug!(path = %config_path.display(), "loaded configuration");
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &ConfigFile, explicit: Option<&Path>) -> Result<PathBuf> {
    let config_path = resolve_config_path(explicit)?;

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }
    }

    let content = toml::to_string_pretty(config).map_err(|e| {
        Error::InvalidConfig(format!("Failed to serialize config: {}", e))
    })?;

    fs::write(&config_path, content).map_err(|e| {
        Error::Config(format!("Failed to write config file: {}", e))
    })?;

    // Set secure permissions on config file (read/write for owner only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&config_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&config_path, perms)?;
    }

    Ok(config_path)
}

/// Validate configuration
pub fn validate_config(config: &ConfigFile) -> Result<()> {
    let store = &config.store;

    if store.access_key_id.is_some() != store.secret_access_key.is_some() {
        return Err(Error::InvalidConfig(
            "access_key_id and secret_access_key must be set together".to_string(),
        ));
    }

    if store.session_token.is_some() && !store.has_static_credentials() {
        return Err(Error::InvalidConfig(
            "session_token requires access_key_id and secret_access_key".to_string(),
        ));
    }

    if !matches!(store.list_version, 1 | 2) {
        return Err(Error::UnsupportedVersion(format!(
            "list_version must be 1 or 2, got {}",
            store.list_version
        )));
    }

    let advanced = &config.advanced;
    validate_page_size("list_page_size", advanced.list_page_size)?;
    validate_page_size("delete_page_size", advanced.delete_page_size)?;

    if advanced.upload_threads == 0 {
        return Err(Error::InvalidConfig("upload_threads must be at least 1".to_string()));
    }

    if advanced.multipart_chunk_size_mb < MIN_MULTIPART_CHUNK_MB {
        return Err(Error::InvalidConfig(format!(
            "multipart_chunk_size_mb must be at least {}",
            MIN_MULTIPART_CHUNK_MB
        )));
    }

    if config.output.separator.len() != 1 {
        return Err(Error::InvalidConfig(
            "output separator must be a single byte character".to_string(),
        ));
    }

    Ok(())
}

/// Check a list or delete page size against the S3 request limit
pub fn validate_page_size(name: &str, size: usize) -> Result<()> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(Error::InvalidConfig(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_PAGE_SIZE, size
        )));
    }
    Ok(())
}

/// Check if the default configuration file exists
pub fn config_exists() -> bool {
    get_config_path().map(|p| p.exists()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConfigFile::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.store.list_version, 2);
        assert_eq!(config.advanced.delete_page_size, 500);
        assert_eq!(config.output.separator, "\t");
    }

    #[test]
    fn test_partial_credentials_rejected() {
        let mut config = ConfigFile::default();
        config.store.access_key_id = Some("AKIAEXAMPLE".to_string());
        assert!(validate_config(&config).is_err());

        config.store.secret_access_key = Some("secret".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_session_token_needs_keys() {
        let mut config = ConfigFile::default();
        config.store.session_token = Some("token".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_list_version() {
        let mut config = ConfigFile::default();
        config.store.list_version = 3;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);

        config.store.list_version = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_page_size_bounds() {
        assert!(validate_page_size("p", 0).is_err());
        assert!(validate_page_size("p", 1).is_ok());
        assert!(validate_page_size("p", 1000).is_ok());
        assert!(validate_page_size("p", 1001).is_err());
    }

    #[test]
    fn test_chunk_size_minimum() {
        let mut config = ConfigFile::default();
        config.advanced.multipart_chunk_size_mb = 4;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ConfigFile = toml::from_str(
            r#"
            [store]
            region = "eu-west-2"
            path_style = true
            "#,
        )
        .unwrap();
        assert_eq!(config.store.region.as_deref(), Some("eu-west-2"));
        assert!(config.store.path_style);
        assert_eq!(config.store.list_version, 2);
        assert_eq!(config.advanced.upload_threads, 8);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ConfigFile::default();
        config.store.endpoint = Some("http://localhost:9000".to_string());
        config.advanced.upload_threads = 3;

        let written = save_config(&config, Some(&path)).unwrap();
        assert_eq!(written, path);

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.store.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(loaded.advanced.upload_threads, 3);
    }

    #[test]
    fn test_missing_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
