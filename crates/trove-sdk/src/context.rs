use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trove_bundle::{AssetHandle, BundleCache};
use trove_content::ContentCache;
use trove_crypto::ContentHasher;
use trove_join::SingleFlight;
use trove_resolve::{DependencyResolver, ResolveReport};
use trove_transfer::{Endpoints, FileUpload, HttpTransport, TransferQueue, Transport};
use trove_types::{ContentEntry, ContentGuid, EntryKind, EnvironmentDataEntry};
use trove_verify::HashVerifier;

use crate::config::TroveConfig;
use crate::error::{SdkError, SdkResult};
use crate::publish::{BundleUpload, PublishedBundle};

/// High-level Trove client.
///
/// Owns one instance of every service. Dropping it stops the transfer and
/// bundle workers.
pub struct Trove {
    config: TroveConfig,
    endpoints: Endpoints,
    transfer: Arc<TransferQueue>,
    content: Arc<ContentCache>,
    verifier: HashVerifier,
    bundles: BundleCache,
    resolver: DependencyResolver,
    cache_dir: SingleFlight<Result<(), String>>,
}

impl Trove {
    /// Build a client that talks HTTP to `config.base_url`.
    pub fn new(config: TroveConfig) -> SdkResult<Self> {
        let transport = HttpTransport::new(&config.transfer, config.auth_token.clone())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a client over any [`Transport`].
    pub fn with_transport(config: TroveConfig, transport: Arc<dyn Transport>) -> Self {
        let endpoints = config.endpoints();
        let layout = config.layout();
        let transfer = Arc::new(TransferQueue::spawn(transport, config.transfer.clone()));
        let content = Arc::new(ContentCache::new(Arc::clone(&transfer), endpoints.clone()));
        let verifier = HashVerifier::new();
        let bundles = BundleCache::spawn(layout.clone(), config.platform);
        let resolver = DependencyResolver::new(
            Arc::clone(&content),
            Arc::clone(&transfer),
            verifier.clone(),
            endpoints.clone(),
            layout,
            config.platform,
        );
        info!(base = %endpoints.base(), platform = %config.platform, "trove client ready");
        Self {
            config,
            endpoints,
            transfer,
            content,
            verifier,
            bundles,
            resolver,
            cache_dir: SingleFlight::new(),
        }
    }

    // ---- Accessors ----

    pub fn config(&self) -> &TroveConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn transfer(&self) -> &Arc<TransferQueue> {
        &self.transfer
    }

    pub fn content(&self) -> &Arc<ContentCache> {
        &self.content
    }

    pub fn verifier(&self) -> &HashVerifier {
        &self.verifier
    }

    pub fn bundles(&self) -> &BundleCache {
        &self.bundles
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Create the bundle directory once. Concurrent callers share the
    /// first attempt; a failure is cached until [`SingleFlight::reset`].
    pub async fn ensure_cache_dir(&self) -> SdkResult<()> {
        let dir = self.config.layout().bundle_dir();
        self.cache_dir
            .run(|| async move {
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| format!("{}: {e}", dir.display()))
            })
            .await
            .map_err(SdkError::Io)
    }

    // ---- Environment operations ----

    /// Fetch environment `guid` and bring all of its bundles up to date.
    pub async fn prepare(
        &self,
        guid: &ContentGuid,
        cancel: &CancellationToken,
    ) -> SdkResult<ResolveReport> {
        self.ensure_cache_dir().await?;
        let report = self.resolver.prepare_environment(guid, cancel).await?;
        if !report.is_complete() {
            warn!(
                environment = %guid,
                failed = report.failed.len(),
                missing = report.missing.len(),
                "environment prepared with gaps"
            );
        }
        Ok(report)
    }

    pub async fn resolve(
        &self,
        env: &EnvironmentDataEntry,
        cancel: &CancellationToken,
    ) -> SdkResult<ResolveReport> {
        self.ensure_cache_dir().await?;
        Ok(self.resolver.resolve(env, cancel).await?)
    }

    /// Drop every loaded asset and prepare a different environment.
    pub async fn switch_environment(
        &self,
        guid: &ContentGuid,
        cancel: &CancellationToken,
    ) -> SdkResult<ResolveReport> {
        self.bundles.reset();
        self.prepare(guid, cancel).await
    }

    // ---- Content operations ----

    pub async fn fetch(
        &self,
        guid: &ContentGuid,
        cancel: &CancellationToken,
    ) -> SdkResult<Arc<ContentEntry>> {
        Ok(self.content.fetch(guid, cancel).await?)
    }

    pub async fn list(
        &self,
        kinds: &[EntryKind],
        cancel: &CancellationToken,
    ) -> SdkResult<Vec<Arc<ContentEntry>>> {
        Ok(self.content.fetch_many(kinds, cancel).await?)
    }

    /// Load `asset` (or the first entry) from the bundle behind media `guid`.
    /// The bundle must already be in the local cache.
    pub async fn load(
        &self,
        guid: &ContentGuid,
        asset: Option<&str>,
        cancel: &CancellationToken,
    ) -> SdkResult<AssetHandle> {
        let entry = self.content.fetch(guid, cancel).await?;
        let media = entry
            .as_media()
            .ok_or_else(|| SdkError::NotMedia(guid.clone()))?;
        if !media.requires_local_bundle() {
            return Err(SdkError::NoLocalBundle(guid.clone()));
        }
        let payload = ContentGuid::new(media.payload_id());
        Ok(self.bundles.load(&payload, asset, cancel).await?)
    }

    // ---- Publishing ----

    /// Create the entry when it has no GUID, otherwise replace it.
    pub async fn publish_entry(
        &self,
        entry: ContentEntry,
        cancel: &CancellationToken,
    ) -> SdkResult<Arc<ContentEntry>> {
        let stored = if entry.guid().is_empty() {
            self.content.create(entry, cancel).await?
        } else {
            self.content.update(entry, cancel).await?
        };
        info!(guid = %stored.guid(), kind = %stored.kind(), "entry published");
        Ok(stored)
    }

    /// Upload a platform bundle for a media entry.
    ///
    /// The bundle is hashed locally first. When the server reports a
    /// different hash the server's value wins and a warning is logged.
    pub async fn publish_bundle(
        &self,
        upload: BundleUpload,
        cancel: &CancellationToken,
    ) -> SdkResult<PublishedBundle> {
        let (hash, bytes) = hash_local(&upload.path).await?;
        let url = self.endpoints.asset_upload(&upload.guid, upload.platform);
        let form = FileUpload::new(&upload.path)
            .with_field("platform", upload.platform.as_str())
            .with_field("hash", hash.clone());
        let reply = self.transfer.upload_large(&url, form, cancel).await?;

        let published = match serde_json::from_slice::<PublishedBundle>(&reply) {
            Ok(remote) => {
                if remote.hash != hash {
                    warn!(guid = %upload.guid, local = %hash, remote = %remote.hash, "server hash differs");
                }
                remote
            }
            Err(_) => PublishedBundle {
                guid: upload.guid.clone(),
                platform: upload.platform,
                hash,
                asset_path: String::new(),
                bytes,
                missing_platforms: Vec::new(),
            },
        };
        info!(guid = %published.guid, platform = %published.platform, bytes = published.bytes, "bundle published");
        Ok(published)
    }
}

async fn hash_local(path: &Path) -> SdkResult<(String, u64)> {
    let owned = path.to_path_buf();
    let hash = tokio::task::spawn_blocking(move || ContentHasher::hash_file(&owned))
        .await
        .map_err(|e| SdkError::Io(e.to_string()))?
        .map_err(|e| SdkError::Io(e.to_string()))?;
    let bytes = tokio::fs::metadata(path).await?.len();
    Ok((hash, bytes))
}
