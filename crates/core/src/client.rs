//! Store client built on the AWS S3 SDK

use crate::config::{AdvancedConfig, ConfigFile, StoreConfig};
use crate::error::{Error, Result};
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::Region,
    primitives::ByteStream,
    types::{
        BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration,
    },
    error::SdkError,
    Client,
};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Region the SDK falls back to when none is configured anywhere
pub const DEFAULT_REGION: &str = "us-east-1";

const MB: u64 = 1024 * 1024;

const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

/// Connection to an S3 store
#[derive(Clone)]
pub struct StoreClient {
    client: Client,
    sdk_config: SdkConfig,
    endpoint: Option<String>,
    region: String,
    list_version: u8,
    list_page_size: i32,
    multipart: MultipartUploadConfig,
}

/// When and how files are uploaded in parts
#[derive(Debug, Clone, Copy)]
pub struct MultipartUploadConfig {
    /// Files at least this size are uploaded in parts
    pub threshold: u64,
    pub chunk_size: u64,
}

impl Default for MultipartUploadConfig {
    fn default() -> Self {
        Self {
            threshold: 64 * MB,
            chunk_size: 16 * MB,
        }
    }
}

/// Whether a file of `size` bytes goes through the multipart path
pub fn requires_multipart_upload(size: u64, config: &MultipartUploadConfig) -> bool {
    size >= config.threshold
}

/// What the credential chain resolved to, safe to print once sanitized
#[derive(Debug, Clone)]
pub struct CredentialSummary {
    pub access_key_id: String,
    pub has_session_token: bool,
    pub expiry: Option<SystemTime>,
}

impl StoreClient {
    /// Create a client from configuration.
    ///
    /// Static keys in the config take precedence over the default provider chain.
    pub async fn connect(config: &ConfigFile) -> Result<Self> {
        let sdk_config = load_sdk_config(config).await;
        let store = &config.store;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(store.path_style)
            .region(Region::new(region.clone()));
        if let Some(endpoint) = &store.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        debug!(region = %region, endpoint = ?store.endpoint, path_style = store.path_style, "created store client");

        Ok(Self {
            client,
            sdk_config,
            endpoint: store.endpoint.clone(),
            region,
            list_version: store.list_version,
            list_page_size: config.advanced.list_page_size as i32,
            multipart: MultipartUploadConfig {
                threshold: config.advanced.multipart_threshold_mb as u64 * MB,
                chunk_size: config.advanced.multipart_chunk_size_mb as u64 * MB,
            },
        })
    }

    /// The underlying SDK client
    pub fn s3(&self) -> &Client {
        &self.client
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk_config
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn list_version(&self) -> u8 {
        self.list_version
    }

    pub fn list_page_size(&self) -> i32 {
        self.list_page_size
    }

    pub fn multipart_config(&self) -> MultipartUploadConfig {
        self.multipart
    }

    /// Resolve credentials through the configured provider
    pub async fn resolve_credentials(&self) -> Result<CredentialSummary> {
        let provider = self
            .sdk_config
            .credentials_provider()
            .ok_or_else(|| Error::PermissionDenied("no credentials provider configured".to_string()))?;

        let creds = provider
            .provide_credentials()
            .await
            .map_err(|e| Error::PermissionDenied(format!("failed to resolve credentials: {}", e)))?;

        Ok(CredentialSummary {
            access_key_id: creds.access_key_id().to_string(),
            has_session_token: creds.session_token().is_some(),
            expiry: creds.expiry(),
        })
    }

    /// Probe a bucket, returning the region the store reports for it
    pub async fn head_bucket(&self, bucket: &str) -> Result<Option<String>> {
        let response = self.client.head_bucket().bucket(bucket).send().await?;
        Ok(response.bucket_region().map(str::to_string))
    }

    /// Find the region a bucket lives in
    pub async fn bucket_region(&self, bucket: &str) -> Result<String> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(response) => match response.bucket_region() {
                Some(region) => return Ok(region.to_string()),
                None => debug!(bucket, "HeadBucket returned no region header"),
            },
            Err(e) => {
                // 301 and 403 responses still name the bucket region
                if let Some(region) = region_from_error(&e) {
                    debug!(bucket, region = %region, "region taken from HeadBucket error response");
                    return Ok(region);
                }
                warn!(bucket, error = %Error::from(e), "HeadBucket failed, trying GetBucketLocation");
            }
        }

        let response = self.client.get_bucket_location().bucket(bucket).send().await?;
        let region = response
            .location_constraint()
            .map(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_REGION);
        Ok(region.to_string())
    }

    /// Create a bucket in `region`, or the client region if none is given
    pub async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<()> {
        let region = region.unwrap_or(&self.region);
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if region != DEFAULT_REGION {
            let configuration = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build();
            request = request.create_bucket_configuration(configuration);
        }

        request.send().await?;
        info!(bucket, region, "created bucket");
        Ok(())
    }

    /// Versioning status of a bucket: `None` if never enabled
    pub async fn bucket_versioning(&self, bucket: &str) -> Result<Option<String>> {
        let response = self.client.get_bucket_versioning().bucket(bucket).send().await?;
        Ok(response.status().map(|s| s.as_str().to_string()))
    }

    /// Check if an object exists
    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => match Error::from(e) {
                Error::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    /// Copy one version of an object over the current object
    pub async fn copy_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(bucket)
            .key(key)
            .copy_source(build_copy_source(bucket, key, Some(version_id)))
            .send()
            .await?;
        Ok(())
    }

    /// Abort a pending multipart upload
    pub async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }

    /// Upload a local file, switching to a multipart upload for large files
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        content_type: &str,
    ) -> Result<u64> {
        let size = tokio::fs::metadata(file_path).await?.len();

        if requires_multipart_upload(size, &self.multipart) {
            self.upload_multipart(bucket, key, file_path, size, content_type).await?;
        } else {
            let body = ByteStream::from_path(file_path).await?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .content_type(content_type)
                .send()
                .await?;
        }

        Ok(size)
    }

    /// Upload in parts; the upload is aborted if any part fails
    async fn upload_multipart(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        size: u64,
        content_type: &str,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::StoreOperation(format!("no upload id returned for {}", key)))?
            .to_string();

        match self.upload_parts(bucket, key, &upload_id, file_path, size).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
                    .send()
                    .await?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = self.abort_multipart_upload(bucket, key, &upload_id).await {
                    warn!(key, upload_id = %upload_id, error = %abort, "failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        file_path: &Path,
        size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = File::open(file_path).await?;
        let mut parts = Vec::new();
        let mut remaining = size;
        let mut part_number = 1;

        while remaining > 0 {
            let length = remaining.min(self.multipart.chunk_size) as usize;
            let mut buffer = vec![0u8; length];
            file.read_exact(&mut buffer).await?;

            let response = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer))
                .send()
                .await?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            debug!(key, part_number, length, "uploaded part");

            remaining -= length as u64;
            part_number += 1;
        }

        Ok(parts)
    }
}

fn timeout_config(advanced: &AdvancedConfig) -> TimeoutConfig {
    TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(advanced.timeout))
        .build()
}

/// The `x-amz-bucket-region` header of a failed request, whatever its status
fn region_from_error<E>(err: &SdkError<E>) -> Option<String> {
    err.raw_response()
        .and_then(|response| response.headers().get(BUCKET_REGION_HEADER))
        .filter(|region| !region.is_empty())
        .map(str::to_string)
}

/// Build the shared SDK configuration from the `[store]` and `[advanced]` sections
async fn load_sdk_config(config: &ConfigFile) -> SdkConfig {
    let store: &StoreConfig = &config.store;

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::standard().with_max_attempts(config.advanced.max_retries + 1))
        .timeout_config(timeout_config(&config.advanced));

    if let Some(profile) = &store.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = &store.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let (Some(access_key_id), Some(secret_access_key)) = (&store.access_key_id, &store.secret_access_key) {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            store.session_token.clone(),
            None,
            "cloudstore-config",
        );
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}

/// URL-encoded `copy_source` value for CopyObject
pub fn build_copy_source(bucket: &str, key: &str, version_id: Option<&str>) -> String {
    let encoded_key = urlencoding::encode(key);
    match version_id {
        Some(vid) => format!("{}/{}?versionId={}", bucket, encoded_key, urlencoding::encode(vid)),
        None => format!("{}/{}", bucket, encoded_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_multipart_upload() {
        let config = MultipartUploadConfig::default();
        assert!(!requires_multipart_upload(0, &config));
        assert!(!requires_multipart_upload(64 * MB - 1, &config));
        assert!(requires_multipart_upload(64 * MB, &config));
    }

    #[test]
    fn test_build_copy_source() {
        assert_eq!(build_copy_source("b", "dir/a b.txt", None), "b/dir%2Fa%20b.txt");
        assert_eq!(
            build_copy_source("b", "k", Some("v+1")),
            "b/k?versionId=v%2B1"
        );
    }

    fn failed_response(status: u16, region: Option<&'static str>) -> SdkError<std::io::Error> {
        let mut raw = aws_sdk_s3::config::http::HttpResponse::new(
            status.try_into().unwrap(),
            aws_smithy_types::body::SdkBody::empty(),
        );
        if let Some(region) = region {
            raw.headers_mut().insert(BUCKET_REGION_HEADER, region);
        }
        SdkError::response_error(std::io::Error::other("redirect"), raw)
    }

    #[test]
    fn test_region_from_redirect_and_forbidden() {
        assert_eq!(
            region_from_error(&failed_response(301, Some("eu-west-2"))).as_deref(),
            Some("eu-west-2")
        );
        assert_eq!(
            region_from_error(&failed_response(403, Some("ap-south-1"))).as_deref(),
            Some("ap-south-1")
        );
        assert_eq!(region_from_error(&failed_response(404, None)), None);
    }

    #[test]
    fn test_region_from_error_without_response() {
        let err: SdkError<std::io::Error> = SdkError::timeout_error(std::io::Error::other("slow"));
        assert_eq!(region_from_error(&err), None);
    }

    #[test]
    fn test_timeout_applies_to_connect_only() {
        let advanced = AdvancedConfig {
            timeout: 12,
            ..Default::default()
        };
        let timeouts = timeout_config(&advanced);
        assert_eq!(timeouts.connect_timeout(), Some(Duration::from_secs(12)));
        assert_eq!(timeouts.operation_timeout(), None);
    }

    #[tokio::test]
    async fn test_connect_uses_configured_store() {
        let mut config = ConfigFile::default();
        config.store.region = Some("eu-west-1".to_string());
        config.store.endpoint = Some("http://localhost:9000".to_string());
        config.store.access_key_id = Some("AKIDEXAMPLE".to_string());
        config.store.secret_access_key = Some("secretsecretsecretsecret".to_string());
        config.advanced.multipart_threshold_mb = 8;

        let client = StoreClient::connect(&config).await.unwrap();
        assert_eq!(client.region(), "eu-west-1");
        assert_eq!(client.endpoint(), Some("http://localhost:9000"));
        assert_eq!(client.list_version(), 2);
        assert_eq!(client.multipart_config().threshold, 8 * MB);

        let creds = client.resolve_credentials().await.unwrap();
        assert_eq!(creds.access_key_id, "AKIDEXAMPLE");
        assert!(!creds.has_session_token);
    }
}
