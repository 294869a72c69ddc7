//! S3 listings: objects, object versions, multipart uploads and upload parts.
//!
//! Each listing is a [`PageSource`], so callers drive them through
//! [`PagedListing`](crate::paging::PagedListing).

use crate::client::StoreClient;
use crate::error::{Error, Result};
use crate::paging::{ListingPage, PageSource};
use crate::uri::StorePath;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Convert an SDK timestamp
pub fn to_utc(dt: Option<&aws_smithy_types::DateTime>) -> Option<DateTime<Utc>> {
    dt.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
}

/// True if `timestamp` passes both optional age bounds relative to `now`.
///
/// `older_than` keeps entries at least that old; `newer_than` keeps entries
/// modified within that window. Entries without a timestamp only pass when
/// no bound is set.
pub fn within_age(
    timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    older_than: Option<chrono::Duration>,
    newer_than: Option<chrono::Duration>,
) -> bool {
    if older_than.is_none() && newer_than.is_none() {
        return true;
    }
    let Some(ts) = timestamp else {
        return false;
    };
    let age = now - ts;
    older_than.map_or(true, |min| age >= min) && newer_than.map_or(true, |max| age <= max)
}

// === Objects ===

/// An object in a listing
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub storage_class: Option<String>,
}

/// One page of ListObjects / ListObjectsV2
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectEntry>,
    /// Common prefixes when listing with a delimiter
    pub prefixes: Vec<String>,
    truncated: bool,
    next: Option<String>,
}

impl ObjectPage {
    pub fn new(objects: Vec<ObjectEntry>, prefixes: Vec<String>, truncated: bool, next: Option<String>) -> Self {
        Self {
            objects,
            prefixes,
            truncated,
            next,
        }
    }
}

impl ListingPage for ObjectPage {
    /// Continuation token (v2) or marker (v1)
    type Token = String;

    fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn next_token(&self) -> Option<String> {
        self.next.clone()
    }

    fn len(&self) -> usize {
        self.objects.len() + self.prefixes.len()
    }
}

/// Object listing under a path, through either list API version
pub struct ObjectListing {
    client: StoreClient,
    bucket: String,
    prefix: String,
    delimiter: Option<String>,
}

impl ObjectListing {
    pub fn new(client: &StoreClient, path: &StorePath, recursive: bool) -> Self {
        Self {
            client: client.clone(),
            bucket: path.bucket.clone(),
            prefix: path.prefix(),
            delimiter: (!recursive).then(|| "/".to_string()),
        }
    }

    async fn fetch_v1(&self, marker: Option<&String>) -> Result<ObjectPage> {
        let response = self
            .client
            .s3()
            .list_objects()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .set_delimiter(self.delimiter.clone())
            .max_keys(self.client.list_page_size())
            .set_marker(marker.cloned())
            .send()
            .await?;

        let objects: Vec<ObjectEntry> = response.contents().iter().map(object_entry).collect();
        let prefixes = common_prefixes(response.common_prefixes());

        let next = v1_next_marker(response.next_marker(), &objects, &prefixes);

        Ok(ObjectPage::new(
            objects,
            prefixes,
            response.is_truncated().unwrap_or(false),
            next,
        ))
    }

    async fn fetch_v2(&self, token: Option<&String>) -> Result<ObjectPage> {
        let response = self
            .client
            .s3()
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .set_delimiter(self.delimiter.clone())
            .max_keys(self.client.list_page_size())
            .set_continuation_token(token.cloned())
            .send()
            .await?;

        Ok(ObjectPage::new(
            response.contents().iter().map(object_entry).collect(),
            common_prefixes(response.common_prefixes()),
            response.is_truncated().unwrap_or(false),
            response.next_continuation_token().map(str::to_string),
        ))
    }
}

#[async_trait]
impl PageSource for ObjectListing {
    type Page = ObjectPage;

    async fn fetch_page(&self, token: Option<&String>) -> Result<ObjectPage> {
        match self.client.list_version() {
            1 => self.fetch_v1(token).await,
            2 => self.fetch_v2(token).await,
            other => Err(Error::UnsupportedVersion(format!("list version {}", other))),
        }
    }

    fn describe(&self) -> String {
        format!("objects s3://{}/{}", self.bucket, self.prefix)
    }
}

/// Where a v1 listing resumes. NextMarker is only returned with a delimiter;
/// otherwise continue after the greater of the last key and the last prefix.
pub fn v1_next_marker(
    next_marker: Option<&str>,
    objects: &[ObjectEntry],
    prefixes: &[String],
) -> Option<String> {
    next_marker.map(str::to_string).or_else(|| {
        let last_key = objects.last().map(|o| o.key.clone());
        let last_prefix = prefixes.last().cloned();
        last_key.max(last_prefix)
    })
}

fn object_entry(obj: &aws_sdk_s3::types::Object) -> ObjectEntry {
    ObjectEntry {
        key: obj.key().unwrap_or_default().to_string(),
        size: obj.size().unwrap_or(0),
        last_modified: to_utc(obj.last_modified()),
        etag: obj.e_tag().map(str::to_string),
        storage_class: obj.storage_class().map(|c| c.as_str().to_string()),
    }
}

fn common_prefixes(prefixes: &[aws_sdk_s3::types::CommonPrefix]) -> Vec<String> {
    prefixes
        .iter()
        .filter_map(|p| p.prefix().map(str::to_string))
        .collect()
}

// === Versions ===

/// A version or delete marker of an object
#[derive(Debug, Clone, PartialEq)]
pub struct VersionEntry {
    pub key: String,
    pub version_id: Option<String>,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_latest: bool,
    pub is_delete_marker: bool,
}

impl VersionEntry {
    /// Key ends in `/`
    pub fn is_directory_marker(&self) -> bool {
        crate::uri::is_directory_marker(&self.key)
    }
}

/// Position to resume a version listing from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    pub key_marker: String,
    pub version_id_marker: Option<String>,
}

/// One page of ListObjectVersions, versions and delete markers merged in key order
#[derive(Debug, Clone, Default)]
pub struct VersionPage {
    pub entries: Vec<VersionEntry>,
    truncated: bool,
    next: Option<VersionMarker>,
}

impl VersionPage {
    pub fn new(mut entries: Vec<VersionEntry>, truncated: bool, next: Option<VersionMarker>) -> Self {
        // Latest first within a key, then newest first; timestamps often tie at whole seconds
        entries.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then(b.is_latest.cmp(&a.is_latest))
                .then(b.last_modified.cmp(&a.last_modified))
        });
        Self {
            entries,
            truncated,
            next,
        }
    }
}

impl ListingPage for VersionPage {
    type Token = VersionMarker;

    fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn next_token(&self) -> Option<VersionMarker> {
        self.next.clone()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Version listing under a path
pub struct VersionListing {
    client: StoreClient,
    bucket: String,
    prefix: String,
}

impl VersionListing {
    pub fn new(client: &StoreClient, path: &StorePath) -> Self {
        Self {
            client: client.clone(),
            bucket: path.bucket.clone(),
            prefix: path.key.clone(),
        }
    }
}

#[async_trait]
impl PageSource for VersionListing {
    type Page = VersionPage;

    async fn fetch_page(&self, token: Option<&VersionMarker>) -> Result<VersionPage> {
        let response = self
            .client
            .s3()
            .list_object_versions()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .max_keys(self.client.list_page_size())
            .set_key_marker(token.map(|t| t.key_marker.clone()))
            .set_version_id_marker(token.and_then(|t| t.version_id_marker.clone()))
            .send()
            .await?;

        let versions = response.versions().iter().map(|v| VersionEntry {
            key: v.key().unwrap_or_default().to_string(),
            version_id: v.version_id().map(str::to_string),
            size: v.size().unwrap_or(0),
            last_modified: to_utc(v.last_modified()),
            is_latest: v.is_latest().unwrap_or(false),
            is_delete_marker: false,
        });
        let markers = response.delete_markers().iter().map(|m| VersionEntry {
            key: m.key().unwrap_or_default().to_string(),
            version_id: m.version_id().map(str::to_string),
            size: 0,
            last_modified: to_utc(m.last_modified()),
            is_latest: m.is_latest().unwrap_or(false),
            is_delete_marker: true,
        });

        let next = response.next_key_marker().map(|key| VersionMarker {
            key_marker: key.to_string(),
            version_id_marker: response.next_version_id_marker().map(str::to_string),
        });

        Ok(VersionPage::new(
            versions.chain(markers).collect(),
            response.is_truncated().unwrap_or(false),
            next,
        ))
    }

    fn describe(&self) -> String {
        format!("versions s3://{}/{}", self.bucket, self.prefix)
    }
}

// === Multipart uploads ===

/// A pending multipart upload
#[derive(Debug, Clone)]
pub struct UploadEntry {
    pub key: String,
    pub upload_id: String,
    pub initiated: Option<DateTime<Utc>>,
}

/// Position to resume an upload listing from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMarker {
    pub key_marker: String,
    pub upload_id_marker: Option<String>,
}

/// One page of ListMultipartUploads
#[derive(Debug, Clone, Default)]
pub struct UploadPage {
    pub uploads: Vec<UploadEntry>,
    truncated: bool,
    next: Option<UploadMarker>,
}

impl ListingPage for UploadPage {
    type Token = UploadMarker;

    fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn next_token(&self) -> Option<UploadMarker> {
        self.next.clone()
    }

    fn len(&self) -> usize {
        self.uploads.len()
    }
}

/// Pending multipart uploads under a path
pub struct MultipartListing {
    client: StoreClient,
    bucket: String,
    prefix: String,
}

impl MultipartListing {
    pub fn new(client: &StoreClient, path: &StorePath) -> Self {
        Self {
            client: client.clone(),
            bucket: path.bucket.clone(),
            prefix: path.key.clone(),
        }
    }
}

#[async_trait]
impl PageSource for MultipartListing {
    type Page = UploadPage;

    async fn fetch_page(&self, token: Option<&UploadMarker>) -> Result<UploadPage> {
        let response = self
            .client
            .s3()
            .list_multipart_uploads()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .max_uploads(self.client.list_page_size())
            .set_key_marker(token.map(|t| t.key_marker.clone()))
            .set_upload_id_marker(token.and_then(|t| t.upload_id_marker.clone()))
            .send()
            .await?;

        let uploads = response
            .uploads()
            .iter()
            .map(|u| UploadEntry {
                key: u.key().unwrap_or_default().to_string(),
                upload_id: u.upload_id().unwrap_or_default().to_string(),
                initiated: to_utc(u.initiated()),
            })
            .collect();

        let next = response.next_key_marker().map(|key| UploadMarker {
            key_marker: key.to_string(),
            upload_id_marker: response.next_upload_id_marker().map(str::to_string),
        });

        Ok(UploadPage {
            uploads,
            truncated: response.is_truncated().unwrap_or(false),
            next,
        })
    }

    fn describe(&self) -> String {
        format!("uploads s3://{}/{}", self.bucket, self.prefix)
    }
}

// === Parts of one upload ===

/// An uploaded part of a pending multipart upload
#[derive(Debug, Clone)]
pub struct PartEntry {
    pub part_number: i32,
    pub size: i64,
    pub etag: Option<String>,
}

/// One page of ListParts
#[derive(Debug, Clone, Default)]
pub struct PartPage {
    pub parts: Vec<PartEntry>,
    truncated: bool,
    next: Option<String>,
}

impl ListingPage for PartPage {
    /// Part number marker
    type Token = String;

    fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn next_token(&self) -> Option<String> {
        self.next.clone()
    }

    fn len(&self) -> usize {
        self.parts.len()
    }
}

/// Parts uploaded so far for one multipart upload
pub struct PartListing {
    client: StoreClient,
    bucket: String,
    key: String,
    upload_id: String,
}

impl PartListing {
    pub fn new(client: &StoreClient, bucket: &str, upload: &UploadEntry) -> Self {
        Self {
            client: client.clone(),
            bucket: bucket.to_string(),
            key: upload.key.clone(),
            upload_id: upload.upload_id.clone(),
        }
    }
}

#[async_trait]
impl PageSource for PartListing {
    type Page = PartPage;

    async fn fetch_page(&self, token: Option<&String>) -> Result<PartPage> {
        let response = self
            .client
            .s3()
            .list_parts()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .max_parts(self.client.list_page_size())
            .set_part_number_marker(token.cloned())
            .send()
            .await?;

        let parts = response
            .parts()
            .iter()
            .map(|p| PartEntry {
                part_number: p.part_number().unwrap_or(0),
                size: p.size().unwrap_or(0),
                etag: p.e_tag().map(str::to_string),
            })
            .collect();

        Ok(PartPage {
            parts,
            truncated: response.is_truncated().unwrap_or(false),
            next: response.next_part_number_marker().map(str::to_string),
        })
    }

    fn describe(&self) -> String {
        format!("parts of {} in s3://{}/{}", self.upload_id, self.bucket, self.key)
    }
}
