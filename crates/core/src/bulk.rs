//! Bulk delete batching.
//!
//! Callers decide what to delete; [`DeleteBatcher`] only groups candidates
//! into pages and issues one bulk-delete request per full page, plus a final
//! one for whatever is left.

use crate::client::StoreClient;
use crate::config::{validate_page_size, MAX_PAGE_SIZE};
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// An object, or one version of it, to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCandidate {
    pub key: String,
    pub version_id: Option<String>,
}

impl DeleteCandidate {
    pub fn new(key: impl Into<String>, version_id: Option<String>) -> Self {
        Self {
            key: key.into(),
            version_id,
        }
    }
}

/// An entry the store refused to delete
#[derive(Debug, Clone)]
pub struct DeleteFailure {
    pub key: String,
    pub version_id: Option<String>,
    pub code: String,
    pub message: String,
}

/// Result of one bulk delete request
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub deleted: usize,
    pub failures: Vec<DeleteFailure>,
}

/// Totals after a batcher is finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub candidates: usize,
    pub deleted: usize,
    pub flushes: usize,
}

/// Something that can delete a batch of entries in one request
#[async_trait]
pub trait BulkDeleter: Send + Sync {
    async fn delete_batch(&self, batch: &[DeleteCandidate]) -> Result<BatchOutcome>;
}

/// Accumulates candidates and flushes them a page at a time
pub struct DeleteBatcher<'a, D: BulkDeleter + ?Sized> {
    deleter: &'a D,
    page_size: usize,
    pending: Vec<DeleteCandidate>,
    summary: DeleteSummary,
}

impl<'a, D: BulkDeleter + ?Sized> DeleteBatcher<'a, D> {
    pub fn new(deleter: &'a D, page_size: usize) -> Result<Self> {
        validate_page_size("delete page size", page_size)?;
        Ok(Self {
            deleter,
            page_size,
            pending: Vec::with_capacity(page_size),
            summary: DeleteSummary::default(),
        })
    }

    /// Add a candidate, flushing if the page is now full
    pub async fn push(&mut self, candidate: DeleteCandidate) -> Result<()> {
        self.pending.push(candidate);
        self.summary.candidates += 1;
        if self.pending.len() >= self.page_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Candidates waiting for the next flush
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Flush the remainder and return the totals
    pub async fn finish(mut self) -> Result<DeleteSummary> {
        if !self.pending.is_empty() {
            self.flush().await?;
        }
        Ok(self.summary)
    }

    async fn flush(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.pending);
        self.pending.reserve(self.page_size);
        self.summary.flushes += 1;
        debug!(entries = batch.len(), flush = self.summary.flushes, "flushing delete batch");

        let outcome = self.deleter.delete_batch(&batch).await?;
        self.summary.deleted += outcome.deleted;

        if let Some(first) = outcome.failures.first() {
            let all_access_denied = outcome.failures.iter().all(|f| f.code == "AccessDenied");
            return Err(Error::BulkDelete {
                attempted: batch.len(),
                failed: outcome.failures.len(),
                first: format!("{}: {} {}", first.key, first.code, first.message),
                all_access_denied,
            });
        }
        Ok(())
    }
}

/// Keys from a `bulkdelete` input file: one per line, blank lines and `#` comments skipped
pub fn parse_key_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Deletes through the S3 DeleteObjects API
pub struct S3Deleter {
    client: StoreClient,
    bucket: String,
}

impl S3Deleter {
    pub fn new(client: &StoreClient, bucket: &str) -> Self {
        Self {
            client: client.clone(),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl BulkDeleter for S3Deleter {
    async fn delete_batch(&self, batch: &[DeleteCandidate]) -> Result<BatchOutcome> {
        if batch.len() > MAX_PAGE_SIZE {
            return Err(Error::Usage(format!(
                "bulk delete of {} entries exceeds the limit of {}",
                batch.len(),
                MAX_PAGE_SIZE
            )));
        }

        let objects = batch
            .iter()
            .map(|c| {
                ObjectIdentifier::builder()
                    .key(&c.key)
                    .set_version_id(c.version_id.clone())
                    .build()
                    .map_err(|e| Error::StoreOperation(format!("building ObjectIdentifier: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| Error::StoreOperation(format!("building Delete: {}", e)))?;

        let response = self
            .client
            .s3()
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await?;

        // Quiet mode only reports failures
        let failures: Vec<DeleteFailure> = response
            .errors()
            .iter()
            .map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                version_id: e.version_id().map(str::to_string),
                code: e.code().unwrap_or("Unknown").to_string(),
                message: e.message().unwrap_or_default().to_string(),
            })
            .collect();

        Ok(BatchOutcome {
            deleted: batch.len() - failures.len(),
            failures,
        })
    }
}

/// Logs what would be deleted without touching the store
#[derive(Debug, Default)]
pub struct DryRunDeleter {
    batches: AtomicUsize,
}

impl DryRunDeleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BulkDeleter for DryRunDeleter {
    async fn delete_batch(&self, batch: &[DeleteCandidate]) -> Result<BatchOutcome> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        for candidate in batch {
            info!(
                key = %candidate.key,
                version = candidate.version_id.as_deref().unwrap_or("-"),
                "dry run: would delete"
            );
        }
        Ok(BatchOutcome {
            deleted: batch.len(),
            failures: Vec::new(),
        })
    }
}
