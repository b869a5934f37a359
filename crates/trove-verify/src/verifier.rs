use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trove_crypto::{ContentHasher, HasherError};

use crate::error::{VerifyError, VerifyResult};

/// Result of checking one local file against its expected digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Match,
    Mismatch { actual: String },
    /// The file does not exist. Nothing is deleted.
    Missing,
    /// The file exists but could not be read.
    Unreadable(String),
}

impl VerifyOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, VerifyOutcome::Match)
    }
}

struct Request {
    path: PathBuf,
    expected: String,
    reply: oneshot::Sender<VerifyOutcome>,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<VecDeque<Request>>,
    draining: AtomicBool,
    hashed: AtomicU64,
    drains: AtomicU64,
}

impl Shared {
    fn pop(&self) -> Option<Request> {
        self.queue.lock().expect("verify queue lock poisoned").pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue
            .lock()
            .expect("verify queue lock poisoned")
            .is_empty()
    }

    fn try_lease(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Queue-backed file hash verifier.
///
/// Cloning is cheap; clones share the queue and the worker lease.
#[derive(Clone, Default)]
pub struct HashVerifier {
    shared: Arc<Shared>,
}

impl HashVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash `path` on the background worker and compare it with `expected`.
    pub async fn verify(
        &self,
        path: &Path,
        expected: &str,
        cancel: &CancellationToken,
    ) -> VerifyResult<VerifyOutcome> {
        let (reply, rx) = oneshot::channel();
        self.shared
            .queue
            .lock()
            .expect("verify queue lock poisoned")
            .push_back(Request {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                reply,
            });
        self.ensure_worker()?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VerifyError::Cancelled),
            outcome = rx => outcome.map_err(|_| VerifyError::WorkerGone),
        }
    }

    /// Files hashed since construction.
    pub fn hashed(&self) -> u64 {
        self.shared.hashed.load(Ordering::Relaxed)
    }

    /// Drain threads started since construction.
    pub fn drains(&self) -> u64 {
        self.shared.drains.load(Ordering::Relaxed)
    }

    fn ensure_worker(&self) -> VerifyResult<()> {
        if !self.shared.try_lease() {
            return Ok(());
        }
        self.shared.drains.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("trove-hash-verifier".into())
            .spawn(move || drain(shared));
        if let Err(e) = spawned {
            self.shared.draining.store(false, Ordering::Release);
            return Err(VerifyError::WorkerSpawn(e.to_string()));
        }
        Ok(())
    }
}

fn drain(shared: Arc<Shared>) {
    loop {
        while let Some(request) = shared.pop() {
            let outcome = check(&request.path, &request.expected, &shared);
            let _ = request.reply.send(outcome);
        }
        shared.draining.store(false, Ordering::Release);
        // A request pushed between the last pop and the release would
        // otherwise wait for the next caller to start a worker.
        if shared.is_empty() || !shared.try_lease() {
            break;
        }
    }
    debug!("hash worker idle");
}

fn check(path: &Path, expected: &str, shared: &Shared) -> VerifyOutcome {
    match ContentHasher::hash_file(path) {
        Ok(actual) => {
            shared.hashed.fetch_add(1, Ordering::Relaxed);
            if actual == expected {
                VerifyOutcome::Match
            } else {
                debug!(path = %path.display(), expected, actual = %actual, "hash mismatch");
                VerifyOutcome::Mismatch { actual }
            }
        }
        Err(HasherError::NotFound(_)) => VerifyOutcome::Missing,
        Err(HasherError::Io(e)) => {
            warn!(path = %path.display(), error = %e, "cannot read file for verification");
            VerifyOutcome::Unreadable(e)
        }
    }
}
