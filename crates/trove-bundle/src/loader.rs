use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use trove_types::{BundleLayout, ContentGuid, Platform};

use crate::archive::BundleArchive;
use crate::error::{BundleError, BundleResult};

/// An asset extracted from a bundle. Outlives the container it came from.
#[derive(Debug, PartialEq, Eq)]
pub struct LoadedAsset {
    pub guid: ContentGuid,
    pub name: String,
    pub data: Bytes,
}

pub type AssetHandle = Arc<LoadedAsset>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BundleSnapshot {
    pub opened: u64,
    pub unloaded: u64,
    pub extracted: u64,
    pub cache_hits: u64,
}

struct LoadJob {
    guid: ContentGuid,
    asset: Option<String>,
    generation: u64,
    reply: oneshot::Sender<BundleResult<AssetHandle>>,
}

#[derive(Default)]
struct Shared {
    assets: Mutex<HashMap<ContentGuid, AssetHandle>>,
    containers: Mutex<HashMap<ContentGuid, Arc<BundleArchive>>>,
    generation: AtomicU64,
    opened: AtomicU64,
    unloaded: AtomicU64,
    extracted: AtomicU64,
    cache_hits: AtomicU64,
}

impl Shared {
    fn cached(&self, guid: &ContentGuid) -> Option<AssetHandle> {
        let hit = self
            .assets
            .lock()
            .expect("asset cache lock poisoned")
            .get(guid)
            .cloned();
        if hit.is_some() {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn unload(&self, guid: &ContentGuid) {
        let removed = self
            .containers
            .lock()
            .expect("container lock poisoned")
            .remove(guid);
        if removed.is_some() {
            self.unloaded.fetch_add(1, Ordering::Relaxed);
            debug!(guid = %guid, "bundle container unloaded");
        }
    }
}

/// Sequential bundle loader with an extracted-asset cache.
///
/// Loads are processed one at a time in request order. Requests for the
/// same GUID are not coalesced: each is queued, and a request whose GUID was
/// cached by an earlier load is answered from the cache when dequeued.
pub struct BundleCache {
    layout: BundleLayout,
    platform: Platform,
    shared: Arc<Shared>,
    jobs: mpsc::UnboundedSender<LoadJob>,
    _stop_loop: DropGuard,
}

impl BundleCache {
    /// Start the load loop on the current tokio runtime.
    pub fn spawn(layout: BundleLayout, platform: Platform) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let stop = CancellationToken::new();
        tokio::spawn(load_loop(
            rx,
            Arc::clone(&shared),
            layout.clone(),
            platform,
            stop.child_token(),
        ));
        Self {
            layout,
            platform,
            shared,
            jobs,
            _stop_loop: stop.drop_guard(),
        }
    }

    /// Load the bundle for `guid` and extract `asset` (or its first entry).
    ///
    /// A bundle that cannot be opened or decoded is deleted from disk so the
    /// next resolution downloads it again.
    pub async fn load(
        &self,
        guid: &ContentGuid,
        asset: Option<&str>,
        cancel: &CancellationToken,
    ) -> BundleResult<AssetHandle> {
        if let Some(hit) = self.shared.cached(guid) {
            return Ok(hit);
        }
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(LoadJob {
                guid: guid.clone(),
                asset: asset.map(str::to_string),
                generation: self.shared.generation.load(Ordering::Acquire),
                reply,
            })
            .map_err(|_| BundleError::LoaderClosed)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BundleError::Cancelled),
            outcome = rx => outcome.unwrap_or(Err(BundleError::LoaderClosed)),
        }
    }

    pub fn cached(&self, guid: &ContentGuid) -> Option<AssetHandle> {
        self.shared
            .assets
            .lock()
            .expect("asset cache lock poisoned")
            .get(guid)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.assets.lock().expect("asset cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bundle path for `guid` on this loader's platform.
    pub fn bundle_path(&self, guid: &ContentGuid) -> PathBuf {
        self.layout.bundle_path(guid.as_str(), self.platform)
    }

    /// Clear the asset cache, fail every queued load with
    /// [`BundleError::Reset`] and force-unload open containers.
    pub fn reset(&self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        let cleared = {
            let mut assets = self.shared.assets.lock().expect("asset cache lock poisoned");
            let n = assets.len();
            assets.clear();
            n
        };
        let open: Vec<ContentGuid> = self
            .shared
            .containers
            .lock()
            .expect("container lock poisoned")
            .keys()
            .cloned()
            .collect();
        for guid in &open {
            self.shared.unload(guid);
        }
        info!(cleared, unloaded = open.len(), "bundle cache reset");
    }

    pub fn stats(&self) -> BundleSnapshot {
        BundleSnapshot {
            opened: self.shared.opened.load(Ordering::Relaxed),
            unloaded: self.shared.unloaded.load(Ordering::Relaxed),
            extracted: self.shared.extracted.load(Ordering::Relaxed),
            cache_hits: self.shared.cache_hits.load(Ordering::Relaxed),
        }
    }
}

async fn load_loop(
    mut jobs: mpsc::UnboundedReceiver<LoadJob>,
    shared: Arc<Shared>,
    layout: BundleLayout,
    platform: Platform,
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

        if job.generation != shared.generation.load(Ordering::Acquire) {
            let _ = job.reply.send(Err(BundleError::Reset));
            continue;
        }
        if let Some(hit) = shared.cached(&job.guid) {
            let _ = job.reply.send(Ok(hit));
            continue;
        }

        let path = layout.bundle_path(job.guid.as_str(), platform);
        let outcome = load_one(&shared, &job.guid, job.asset.as_deref(), &path, job.generation).await;
        let _ = job.reply.send(outcome);
    }
    debug!("bundle load loop stopped");
}

async fn load_one(
    shared: &Arc<Shared>,
    guid: &ContentGuid,
    asset: Option<&str>,
    path: &Path,
    generation: u64,
) -> BundleResult<AssetHandle> {
    let open_path = path.to_path_buf();
    let opened = tokio::task::spawn_blocking(move || BundleArchive::open(&open_path))
        .await
        .map_err(|e| BundleError::Io(e.to_string()))
        .and_then(|r| r);
    let archive = match opened {
        Ok(archive) => Arc::new(archive),
        Err(e) => return Err(discard(path, e).await),
    };
    shared.opened.fetch_add(1, Ordering::Relaxed);
    shared
        .containers
        .lock()
        .expect("container lock poisoned")
        .insert(guid.clone(), Arc::clone(&archive));

    let wanted = asset.map(str::to_string);
    let extracted = tokio::task::spawn_blocking(move || archive.extract(wanted.as_deref()))
        .await
        .map_err(|e| BundleError::Io(e.to_string()))
        .and_then(|r| r);
    shared.unload(guid);

    let (name, data) = match extracted {
        Ok(found) => found,
        Err(e) if e.is_corrupt_file() => return Err(discard(path, e).await),
        Err(e) => {
            warn!(guid = %guid, error = %e, "asset missing from bundle");
            return Err(e);
        }
    };
    shared.extracted.fetch_add(1, Ordering::Relaxed);

    let handle = Arc::new(LoadedAsset {
        guid: guid.clone(),
        name,
        data: Bytes::from(data),
    });
    // A reset while this load was running drops the result from the cache.
    if generation == shared.generation.load(Ordering::Acquire) {
        shared
            .assets
            .lock()
            .expect("asset cache lock poisoned")
            .insert(guid.clone(), Arc::clone(&handle));
    }
    debug!(guid = %guid, asset = %handle.name, bytes = handle.data.len(), "asset loaded");
    Ok(handle)
}

/// Delete an unusable bundle and convert the failure into `Corrupt`.
async fn discard(path: &Path, cause: BundleError) -> BundleError {
    match tokio::fs::remove_file(path).await {
        Ok(()) => warn!(path = %path.display(), error = %cause, "deleted corrupt bundle"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "bundle not on disk")
        }
        Err(e) => warn!(path = %path.display(), error = %e, "cannot delete corrupt bundle"),
    }
    BundleError::Corrupt {
        path: path.display().to_string(),
        reason: cause.to_string(),
    }
}
