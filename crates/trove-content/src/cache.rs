use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trove_join::FlightGroup;
use trove_transfer::{Endpoints, SendMethod, TransferError, TransferQueue};
use trove_types::{ContentEntry, ContentGuid, EntryKind};

use crate::error::{ContentError, ContentResult};

type Shared = Arc<ContentEntry>;

/// GUID-keyed cache of content entries.
///
/// The cache owns the canonical copy of every entry; callers receive shared
/// handles. Fetches that fail are not cached, so a later call retries.
pub struct ContentCache {
    transfer: Arc<TransferQueue>,
    endpoints: Endpoints,
    entries: RwLock<HashMap<ContentGuid, Shared>>,
    inflight: FlightGroup<ContentGuid, ContentResult<Shared>>,
}

impl ContentCache {
    pub fn new(transfer: Arc<TransferQueue>, endpoints: Endpoints) -> Self {
        Self {
            transfer,
            endpoints,
            entries: RwLock::new(HashMap::new()),
            inflight: FlightGroup::new(),
        }
    }

    pub fn get(&self, guid: &ContentGuid) -> Option<Shared> {
        self.entries
            .read()
            .expect("content lock poisoned")
            .get(guid)
            .cloned()
    }

    pub fn contains(&self, guid: &ContentGuid) -> bool {
        self.entries
            .read()
            .expect("content lock poisoned")
            .contains_key(guid)
    }

    /// Insert an entry under its own GUID, replacing any previous copy.
    pub fn insert(&self, entry: ContentEntry) -> Shared {
        let entry = Arc::new(entry);
        self.store(entry.guid().clone(), Arc::clone(&entry));
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("content lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached entry for `guid`, or fetch it from `/ContentData/{guid}`.
    pub async fn fetch(&self, guid: &ContentGuid, cancel: &CancellationToken) -> ContentResult<Shared> {
        if guid.is_empty() {
            return Err(ContentError::EmptyGuid);
        }
        if let Some(hit) = self.get(guid) {
            return Ok(hit);
        }
        // The shared request ignores any one caller's token so that a
        // cancelled caller does not fail the others.
        let shared = self
            .inflight
            .run(guid.clone(), || self.fetch_remote(guid.clone()));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled.into()),
            outcome = shared => outcome,
        }
    }

    /// Fetch `guid` and require it to be of `kind`.
    pub async fn fetch_kind(
        &self,
        guid: &ContentGuid,
        kind: EntryKind,
        cancel: &CancellationToken,
    ) -> ContentResult<Shared> {
        let entry = self.fetch(guid, cancel).await?;
        if entry.kind() != kind {
            return Err(ContentError::KindMismatch {
                guid: guid.clone(),
                expected: kind,
                actual: entry.kind(),
            });
        }
        Ok(entry)
    }

    /// Fetch every entry from `/ContentData`, asking the server to filter by
    /// `kinds`. All returned entries are cached and returned as received.
    pub async fn fetch_many(
        &self,
        kinds: &[EntryKind],
        cancel: &CancellationToken,
    ) -> ContentResult<Vec<Shared>> {
        let url = self.endpoints.content_data_query(kinds);
        let entries: Vec<ContentEntry> = self.transfer.download_small(&url, cancel).await?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = Arc::new(entry);
            if entry.guid().is_empty() {
                warn!(kind = %entry.kind(), "listed entry has no guid, not cached");
            } else {
                self.store(entry.guid().clone(), Arc::clone(&entry));
            }
            out.push(entry);
        }
        info!(count = out.len(), "fetched content listing");
        Ok(out)
    }

    /// `POST /ContentData`. An entry without a GUID gets a fresh one.
    pub async fn create(
        &self,
        mut entry: ContentEntry,
        cancel: &CancellationToken,
    ) -> ContentResult<Shared> {
        if entry.guid().is_empty() {
            entry.meta_mut().guid = ContentGuid::generate();
        }
        let url = self.endpoints.content_data_collection();
        let reply = self
            .transfer
            .upload_small(SendMethod::Post, &url, &entry, cancel)
            .await?;
        Ok(self.accept_reply(entry, &reply))
    }

    /// `PUT /ContentData/{guid}`.
    pub async fn update(&self, entry: ContentEntry, cancel: &CancellationToken) -> ContentResult<Shared> {
        if entry.guid().is_empty() {
            return Err(ContentError::EmptyGuid);
        }
        let url = self.endpoints.content_data(entry.guid());
        let reply = self
            .transfer
            .upload_small(SendMethod::Put, &url, &entry, cancel)
            .await?;
        Ok(self.accept_reply(entry, &reply))
    }

    async fn fetch_remote(&self, guid: ContentGuid) -> ContentResult<Shared> {
        let url = self.endpoints.content_data(&guid);
        let mut entry: ContentEntry = self
            .transfer
            .download_small(&url, &CancellationToken::new())
            .await?;
        if entry.guid().is_empty() {
            entry.meta_mut().guid = guid.clone();
        }
        debug!(guid = %guid, kind = %entry.kind(), "content entry fetched");
        let entry = Arc::new(entry);
        self.store(guid, Arc::clone(&entry));
        Ok(entry)
    }

    /// Cache the server's echo of a published entry, or the local copy when
    /// the reply is not an entry.
    fn accept_reply(&self, local: ContentEntry, reply: &[u8]) -> Shared {
        let guid = local.guid().clone();
        let entry = match ContentEntry::from_json(reply) {
            Ok(mut remote) => {
                if remote.guid().is_empty() {
                    remote.meta_mut().guid = guid.clone();
                }
                remote
            }
            Err(_) => local,
        };
        let entry = Arc::new(entry);
        self.store(guid, Arc::clone(&entry));
        entry
    }

    fn store(&self, guid: ContentGuid, entry: Shared) {
        self.entries
            .write()
            .expect("content lock poisoned")
            .insert(guid, entry);
    }
}
