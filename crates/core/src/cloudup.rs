//! Parallel upload of a local directory tree.
//!
//! The largest files are submitted first so a single big file does not
//! finish long after everything else; the rest go in random order to spread
//! requests across the store's key space. At most `threads` uploads are in
//! flight at any time.

use crate::client::StoreClient;
use crate::error::{Error, Result};
use crate::uri::StorePath;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A local file and the key it uploads to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub source: PathBuf,
    pub key: String,
    pub size: u64,
}

/// Collect every regular file under `dir`, keyed beneath `dest`
pub fn scan_directory(dir: &Path, dest: &StorePath) -> Result<Vec<UploadFile>> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("source directory {}", dir.display())));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| Error::Other(format!("{}: {}", entry.path().display(), e)))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(UploadFile {
            source: entry.path().to_path_buf(),
            key: dest.child(&relative).key,
            size: entry.metadata().map_err(std::io::Error::from)?.len(),
        });
    }

    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

/// Order uploads: the `largest` biggest files first, then the rest shuffled
pub fn plan_uploads<R: Rng + ?Sized>(mut files: Vec<UploadFile>, largest: usize, rng: &mut R) -> Vec<UploadFile> {
    files.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.key.cmp(&b.key)));
    let split = largest.min(files.len());
    files[split..].shuffle(rng);
    files
}

/// Copies one file to the store
#[async_trait]
pub trait FileTransfer: Send + Sync + 'static {
    /// Upload the whole file or fail; returns bytes written
    async fn transfer(&self, file: &UploadFile) -> Result<u64>;
}

/// Hooks for progress reporting
pub trait UploadObserver: Send + Sync + 'static {
    fn submitted(&self, _file: &UploadFile) {}
    fn completed(&self, _file: &UploadFile, _result: &Result<u64>) {}
}

/// Observer that does nothing
pub struct NoProgress;

impl UploadObserver for NoProgress {}

/// Uploads into an S3 bucket
pub struct S3Transfer {
    client: StoreClient,
    bucket: String,
    overwrite: bool,
}

impl S3Transfer {
    pub fn new(client: &StoreClient, bucket: &str, overwrite: bool) -> Self {
        Self {
            client: client.clone(),
            bucket: bucket.to_string(),
            overwrite,
        }
    }
}

#[async_trait]
impl FileTransfer for S3Transfer {
    async fn transfer(&self, file: &UploadFile) -> Result<u64> {
        if !self.overwrite && self.client.object_exists(&self.bucket, &file.key).await? {
            debug!(key = %file.key, "object exists, skipping");
            return Ok(0);
        }

        let content_type = mime_guess::from_path(&file.source)
            .first_or_octet_stream()
            .to_string();

        self.client
            .upload_file(&self.bucket, &file.key, &file.source, &content_type)
            .await
    }
}

/// Pool settings for one run
#[derive(Debug, Clone, Copy)]
pub struct CloudUpOptions {
    pub threads: usize,
    /// Keep submitting after a failure
    pub ignore_failures: bool,
    /// How long running uploads may continue after an interrupt
    pub cancel_grace: Duration,
}

impl Default for CloudUpOptions {
    fn default() -> Self {
        Self {
            threads: 8,
            ignore_failures: false,
            cancel_grace: Duration::from_secs(10),
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub planned: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes: u64,
    /// Key and message of the first failure observed
    pub first_failure: Option<(String, String)>,
    pub elapsed: Duration,
    /// The run was stopped by an interrupt
    pub interrupted: bool,
    /// Keys still uploading when the grace period ran out. Multipart uploads
    /// for these may be left pending in the bucket.
    pub abandoned: Vec<String>,
}

impl UploadReport {
    /// Turn a recorded failure into an error unless failures are being ignored
    pub fn into_result(self, ignore_failures: bool) -> Result<UploadReport> {
        if self.interrupted {
            return Err(Error::Cancelled);
        }
        match (&self.first_failure, ignore_failures) {
            (Some((key, message)), false) => Err(Error::Upload {
                key: key.clone(),
                message: message.clone(),
            }),
            _ => Ok(self),
        }
    }

    /// Upload rate in bytes per second
    pub fn bandwidth(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

type Completion = (UploadFile, Result<u64>);

/// Run uploads in plan order with at most `options.threads` in flight.
///
/// Once a failure is seen, submission stops unless `ignore_failures` is set;
/// uploads already running are allowed to finish.
pub async fn run_uploads<T: FileTransfer>(
    transfer: Arc<T>,
    plan: Vec<UploadFile>,
    options: CloudUpOptions,
    observer: Arc<dyn UploadObserver>,
) -> Result<UploadReport> {
    run_uploads_until(transfer, plan, options, observer, std::future::pending()).await
}

/// Like [`run_uploads`], but stops submitting when `interrupt` completes.
///
/// Running uploads then get `options.cancel_grace` to finish. Whatever is
/// still running after that is aborted and listed in
/// [`UploadReport::abandoned`].
pub async fn run_uploads_until<T, F>(
    transfer: Arc<T>,
    plan: Vec<UploadFile>,
    options: CloudUpOptions,
    observer: Arc<dyn UploadObserver>,
    interrupt: F,
) -> Result<UploadReport>
where
    T: FileTransfer,
    F: Future<Output = ()>,
{
    if options.threads == 0 {
        return Err(Error::Usage("thread count must be at least 1".to_string()));
    }

    let started = Instant::now();
    let mut pool = Pool {
        tasks: JoinSet::new(),
        running: BTreeSet::new(),
        report: UploadReport {
            planned: plan.len(),
            ..Default::default()
        },
    };
    tokio::pin!(interrupt);

    for file in plan {
        while pool.tasks.len() >= options.threads {
            tokio::select! {
                joined = pool.tasks.join_next() => {
                    if let Some(joined) = joined {
                        pool.record(joined?);
                    }
                }
                _ = &mut interrupt => return Ok(pool.cancel(options.cancel_grace, started).await),
            }
        }
        while let Some(joined) = pool.tasks.try_join_next() {
            pool.record(joined?);
        }

        if pool.report.first_failure.is_some() && !options.ignore_failures {
            info!(
                remaining = pool.report.planned - pool.report.submitted,
                "upload failed, submitting no more files"
            );
            break;
        }

        observer.submitted(&file);
        pool.report.submitted += 1;
        pool.running.insert(file.key.clone());

        let transfer = Arc::clone(&transfer);
        let observer = Arc::clone(&observer);
        pool.tasks.spawn(async move {
            let result = transfer.transfer(&file).await;
            observer.completed(&file, &result);
            (file, result)
        });
    }

    loop {
        tokio::select! {
            joined = pool.tasks.join_next() => match joined {
                Some(joined) => pool.record(joined?),
                None => break,
            },
            _ = &mut interrupt => return Ok(pool.cancel(options.cancel_grace, started).await),
        }
    }

    pool.report.elapsed = started.elapsed();
    Ok(pool.report)
}

struct Pool {
    tasks: JoinSet<Completion>,
    running: BTreeSet<String>,
    report: UploadReport,
}

impl Pool {
    fn record(&mut self, (file, result): Completion) {
        self.running.remove(&file.key);
        match result {
            Ok(bytes) => {
                self.report.succeeded += 1;
                self.report.bytes += bytes;
            }
            Err(e) => {
                warn!(key = %file.key, source = %file.source.display(), error = %e, "upload failed");
                self.report.failed += 1;
                if self.report.first_failure.is_none() {
                    self.report.first_failure = Some((file.key, e.to_string()));
                }
            }
        }
    }

    /// Wait up to `grace` for running uploads, then abort the rest
    async fn cancel(mut self, grace: Duration, started: Instant) -> UploadReport {
        warn!(running = self.tasks.len(), "interrupted, no further uploads will be submitted");

        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    Some(Ok(completion)) => self.record(completion),
                    Some(Err(e)) => warn!(error = %e, "upload task failed"),
                    None => break,
                },
                _ = &mut deadline => break,
            }
        }

        self.tasks.abort_all();
        for key in &self.running {
            warn!(key = %key, "upload abandoned, a multipart upload may be left pending");
        }
        self.report.interrupted = true;
        self.report.abandoned = std::mem::take(&mut self.running).into_iter().collect();
        self.report.elapsed = started.elapsed();
        self.report
    }
}
