use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::decode::DecodePool;
use crate::error::{TransferError, TransferResult};
use crate::retry::{with_retry, TransferStats};
use crate::transport::{FileUpload, SendMethod, Transport};

type DownloadWaiter = oneshot::Sender<TransferResult<PathBuf>>;
type PendingDownloads = Arc<Mutex<HashMap<String, Vec<DownloadWaiter>>>>;

enum LargeJob {
    Download {
        url: String,
        dest: PathBuf,
    },
    Upload {
        url: String,
        upload: FileUpload,
        reply: oneshot::Sender<TransferResult<Vec<u8>>>,
    },
}

enum SmallRequest {
    Get { url: String },
    Send { method: SendMethod, url: String, body: Vec<u8> },
}

struct SmallJob {
    request: SmallRequest,
    reply: oneshot::Sender<TransferResult<Vec<u8>>>,
}

/// Point-in-time copy of the queue counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub attempts: u64,
    pub completed: u64,
    pub failed: u64,
    /// Large downloads skipped because the destination already existed.
    pub skipped: u64,
    /// Large download requests folded into a transfer already queued.
    pub deduplicated: u64,
}

/// Two FIFO transfer queues with one persistent worker each.
///
/// Jobs on one queue run strictly one at a time in enqueue order. Large
/// downloads are keyed by URL: a request for a URL that is already queued or
/// in flight joins it instead of enqueuing a second transfer, and every
/// waiter receives the single outcome. Dropping the queue stops both workers.
pub struct TransferQueue {
    large_tx: mpsc::UnboundedSender<LargeJob>,
    small_tx: mpsc::UnboundedSender<SmallJob>,
    pending: PendingDownloads,
    decoder: DecodePool,
    stats: Arc<TransferStats>,
    _stop_workers: DropGuard,
}

impl TransferQueue {
    /// Start both workers on the current tokio runtime.
    pub fn spawn(transport: Arc<dyn Transport>, config: TransferConfig) -> Self {
        let (large_tx, large_rx) = mpsc::unbounded_channel();
        let (small_tx, small_rx) = mpsc::unbounded_channel();
        let pending: PendingDownloads = Arc::default();
        let stats = Arc::new(TransferStats::default());
        let stop = CancellationToken::new();
        let attempts = config.max_attempts();

        tokio::spawn(large_worker(
            Arc::clone(&transport),
            large_rx,
            Arc::clone(&pending),
            Arc::clone(&stats),
            attempts,
            stop.child_token(),
        ));
        tokio::spawn(small_worker(
            transport,
            small_rx,
            Arc::clone(&stats),
            attempts,
            stop.child_token(),
        ));
        info!(max_attempts = attempts, "transfer workers started");

        Self {
            large_tx,
            small_tx,
            pending,
            decoder: DecodePool::new(config.decode_concurrency),
            stats,
            _stop_workers: stop.drop_guard(),
        }
    }

    /// Fetch a JSON body on the small queue and decode it as `T`.
    pub async fn download_small<T>(&self, url: &str, cancel: &CancellationToken) -> TransferResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let bytes = self
            .submit_small(
                SmallRequest::Get {
                    url: url.to_string(),
                },
                cancel,
            )
            .await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            decoded = self.decoder.decode::<T>(bytes) => decoded,
        }
    }

    /// Serialize `body` as JSON and send it on the small queue.
    pub async fn upload_small<B: Serialize + ?Sized>(
        &self,
        method: SendMethod,
        url: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> TransferResult<Vec<u8>> {
        let body = serde_json::to_vec(body).map_err(|e| TransferError::Decode(e.to_string()))?;
        self.submit_small(
            SmallRequest::Send {
                method,
                url: url.to_string(),
                body,
            },
            cancel,
        )
        .await
    }

    /// Download `url` to `dest` on the large queue.
    ///
    /// Resolves with `dest` once the file exists. An existing file is treated
    /// as already downloaded. Concurrent calls for the same URL share one
    /// transfer and resolve with the first caller's destination.
    pub async fn download_large(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> TransferResult<PathBuf> {
        let (tx, rx) = oneshot::channel();
        let first = {
            let mut pending = self.pending.lock().expect("lock poisoned");
            match pending.get_mut(url) {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    pending.insert(url.to_string(), vec![tx]);
                    true
                }
            }
        };

        if first {
            let job = LargeJob::Download {
                url: url.to_string(),
                dest: dest.to_path_buf(),
            };
            if self.large_tx.send(job).is_err() {
                self.pending.lock().expect("lock poisoned").remove(url);
                return Err(TransferError::QueueClosed);
            }
        } else {
            self.stats.deduplicated.fetch_add(1, Ordering::Relaxed);
            debug!(url, "joined queued download");
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            outcome = rx => outcome.unwrap_or(Err(TransferError::QueueClosed)),
        }
    }

    /// Upload a local file as a multipart form on the large queue.
    pub async fn upload_large(
        &self,
        url: &str,
        upload: FileUpload,
        cancel: &CancellationToken,
    ) -> TransferResult<Vec<u8>> {
        let (reply, rx) = oneshot::channel();
        self.large_tx
            .send(LargeJob::Upload {
                url: url.to_string(),
                upload,
                reply,
            })
            .map_err(|_| TransferError::QueueClosed)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            outcome = rx => outcome.unwrap_or(Err(TransferError::QueueClosed)),
        }
    }

    /// Distinct large downloads currently queued or in flight.
    pub fn pending_downloads(&self) -> usize {
        self.pending.lock().expect("lock poisoned").len()
    }

    pub fn stats(&self) -> TransferSnapshot {
        TransferSnapshot {
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            deduplicated: self.stats.deduplicated.load(Ordering::Relaxed),
        }
    }

    async fn submit_small(
        &self,
        request: SmallRequest,
        cancel: &CancellationToken,
    ) -> TransferResult<Vec<u8>> {
        let (reply, rx) = oneshot::channel();
        self.small_tx
            .send(SmallJob { request, reply })
            .map_err(|_| TransferError::QueueClosed)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            outcome = rx => outcome.unwrap_or(Err(TransferError::QueueClosed)),
        }
    }
}

async fn large_worker(
    transport: Arc<dyn Transport>,
    mut jobs: mpsc::UnboundedReceiver<LargeJob>,
    pending: PendingDownloads,
    stats: Arc<TransferStats>,
    max_attempts: u32,
    stop: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = stop.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        match job {
            LargeJob::Download { url, dest } => {
                let outcome = download_once(&*transport, &url, &dest, &stats, max_attempts).await;
                let waiters = pending
                    .lock()
                    .expect("lock poisoned")
                    .remove(&url)
                    .unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
            }
            LargeJob::Upload { url, upload, reply } => {
                let outcome =
                    with_retry(max_attempts, &stats, &url, || transport.upload(&url, &upload))
                        .await;
                let _ = reply.send(outcome);
            }
        }
    }
    debug!("large transfer worker stopped");
}

async fn download_once(
    transport: &dyn Transport,
    url: &str,
    dest: &Path,
    stats: &TransferStats,
    max_attempts: u32,
) -> TransferResult<PathBuf> {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        stats.skipped.fetch_add(1, Ordering::Relaxed);
        debug!(url, dest = %dest.display(), "destination exists, skipping download");
        return Ok(dest.to_path_buf());
    }
    if let Some(parent) = dest.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(dest = %dest.display(), error = %e, "cannot create download directory");
            stats.failed.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }
    }
    with_retry(max_attempts, stats, url, || transport.download(url, dest))
        .await
        .map(|_| dest.to_path_buf())
}

async fn small_worker(
    transport: Arc<dyn Transport>,
    mut jobs: mpsc::UnboundedReceiver<SmallJob>,
    stats: Arc<TransferStats>,
    max_attempts: u32,
    stop: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = stop.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let outcome = match &job.request {
            SmallRequest::Get { url } => {
                with_retry(max_attempts, &stats, url, || transport.fetch(url)).await
            }
            SmallRequest::Send { method, url, body } => {
                with_retry(max_attempts, &stats, url, || {
                    transport.send(*method, url, body.clone())
                })
                .await
            }
        };
        let _ = job.reply.send(outcome);
    }
    debug!("small transfer worker stopped");
}
