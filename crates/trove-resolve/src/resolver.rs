use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture, FutureExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trove_content::{ContentCache, ContentError};
use trove_join::{BarrierTicket, CountingBarrier};
use trove_transfer::{Endpoints, TransferQueue};
use trove_types::{
    BundleLayout, ContentEntry, ContentGuid, EntryKind, EnvironmentDataEntry, MediaEntry,
    MediaKind, Platform,
};
use trove_verify::{HashVerifier, VerifyOutcome};

use crate::closure::DependencySet;
use crate::error::{ResolveError, ResolveResult};
use crate::report::{CycleEdge, FailedDownload, MissingEntry, ResolveReport};

/// Walks an environment's content graph and brings its bundles up to date.
///
/// Cloning is cheap; clones share the same services.
#[derive(Clone)]
pub struct DependencyResolver {
    inner: Arc<Inner>,
}

struct Inner {
    content: Arc<ContentCache>,
    transfer: Arc<TransferQueue>,
    verifier: HashVerifier,
    endpoints: Endpoints,
    layout: BundleLayout,
    platform: Platform,
}

#[derive(Default)]
struct Closure {
    dependencies: DependencySet,
    missing: Vec<MissingEntry>,
    cycles: Vec<CycleEdge>,
}

enum Root {
    Scene(ContentGuid),
    Item(ContentGuid),
}

#[derive(Default)]
struct Tally {
    verified: Vec<String>,
    to_download: Vec<String>,
    downloaded: Vec<String>,
    failed: Vec<FailedDownload>,
}

impl DependencyResolver {
    pub fn new(
        content: Arc<ContentCache>,
        transfer: Arc<TransferQueue>,
        verifier: HashVerifier,
        endpoints: Endpoints,
        layout: BundleLayout,
        platform: Platform,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                content,
                transfer,
                verifier,
                endpoints,
                layout,
                platform,
            }),
        }
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    /// Fetch the environment entry for `guid`, then [`resolve`](Self::resolve) it.
    pub async fn prepare_environment(
        &self,
        guid: &ContentGuid,
        cancel: &CancellationToken,
    ) -> ResolveResult<ResolveReport> {
        let entry = self
            .inner
            .content
            .fetch_kind(guid, EntryKind::Environment, cancel)
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    ResolveError::Cancelled
                } else {
                    ResolveError::Environment {
                        guid: guid.clone(),
                        source: e,
                    }
                }
            })?;
        match entry.as_environment() {
            Some(env) => self.resolve(env, cancel).await,
            None => Err(ResolveError::Environment {
                guid: guid.clone(),
                source: ContentError::KindMismatch {
                    guid: guid.clone(),
                    expected: EntryKind::Environment,
                    actual: entry.kind(),
                },
            }),
        }
    }

    /// Compute the closure of `env`, verify every local bundle and download
    /// the ones that are missing or stale.
    ///
    /// Only cancellation fails the call. Everything else degrades into the
    /// report.
    pub async fn resolve(
        &self,
        env: &EnvironmentDataEntry,
        cancel: &CancellationToken,
    ) -> ResolveResult<ResolveReport> {
        let run = Arc::clone(&self.inner).run(env.clone(), cancel.clone());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            report = run => Ok(report),
        }
    }

    /// The dependency closure of `env` alone, without touching the local cache.
    pub async fn closure(
        &self,
        env: &EnvironmentDataEntry,
        cancel: &CancellationToken,
    ) -> ResolveResult<ResolveReport> {
        let work = Arc::clone(&self.inner).collect(env.clone(), cancel.clone());
        let closure = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
            closure = work => closure,
        };
        Ok(ResolveReport {
            environment: env.meta.guid.clone(),
            dependencies: closure.dependencies.into_vec(),
            missing: closure.missing,
            cycles: closure.cycles,
            ..ResolveReport::default()
        })
    }
}

impl Inner {
    async fn run(self: Arc<Self>, env: EnvironmentDataEntry, cancel: CancellationToken) -> ResolveReport {
        let closure = Arc::clone(&self).collect(env.clone(), cancel.clone()).await;
        let dependencies = closure.dependencies.into_vec();

        let (local, streamed): (Vec<&MediaEntry>, Vec<&MediaEntry>) =
            dependencies.iter().partition(|m| m.requires_local_bundle());
        let local: Vec<MediaEntry> = local.into_iter().cloned().collect();
        let streamed: Vec<String> = streamed.iter().map(|m| m.payload_id().to_string()).collect();

        let tally = Arc::new(Mutex::new(Tally::default()));
        Arc::clone(&self)
            .verify_all(local, Arc::clone(&tally), &cancel)
            .await;

        let to_download = tally.lock().expect("tally lock poisoned").to_download.clone();
        if !to_download.is_empty() {
            Arc::clone(&self)
                .download_all(to_download, Arc::clone(&tally), &cancel)
                .await;
        }

        let tally = std::mem::take(&mut *tally.lock().expect("tally lock poisoned"));
        let report = ResolveReport {
            environment: env.meta.guid.clone(),
            dependencies,
            verified: tally.verified,
            streamed,
            to_download: tally.to_download,
            downloaded: tally.downloaded,
            failed: tally.failed,
            missing: closure.missing,
            cycles: closure.cycles,
        };
        info!(
            environment = %report.environment,
            dependencies = report.dependencies.len(),
            verified = report.verified.len(),
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            missing = report.missing.len(),
            "environment resolved"
        );
        report
    }

    // -----------------------------------------------------------------------
    // Closure
    // -----------------------------------------------------------------------

    async fn collect(self: Arc<Self>, env: EnvironmentDataEntry, cancel: CancellationToken) -> Closure {
        let acc = Arc::new(Mutex::new(Closure::default()));
        let (location, graph) = tokio::join!(
            self.fetch_soft(&env.location, Some(EntryKind::Location), &acc, &cancel),
            self.fetch_soft(&env.scene_graph, Some(EntryKind::SceneGraph), &acc, &cancel),
        );

        let mut roots = Vec::new();
        if let Some(location) = location.as_deref().and_then(ContentEntry::as_location) {
            roots.extend(location.scenes.iter().cloned().map(Root::Scene));
        }
        if let Some(graph) = graph.as_deref().and_then(ContentEntry::as_scene_graph) {
            roots.extend(
                graph
                    .scene_items
                    .iter()
                    .map(|item| Root::Item(item.content_guid.clone())),
            );
        }
        debug!(environment = %env.meta.guid, roots = roots.len(), "expanding environment");

        fan_out(roots, |root, ticket| {
            let this = Arc::clone(&self);
            let acc = Arc::clone(&acc);
            let cancel = cancel.clone();
            async move {
                match root {
                    Root::Scene(guid) => this.add_scene(&guid, &acc, &cancel).await,
                    Root::Item(guid) => this.add_item(guid, Vec::new(), &acc, &cancel).await,
                }
                drop(ticket);
            }
        })
        .await;

        let closure = std::mem::take(&mut *acc.lock().expect("closure lock poisoned"));
        closure
    }

    async fn add_scene(&self, guid: &ContentGuid, acc: &Mutex<Closure>, cancel: &CancellationToken) {
        let Some(entry) = self.fetch_soft(guid, Some(EntryKind::Media), acc, cancel).await else {
            return;
        };
        if let Some(media) = entry.as_media() {
            if media.media_kind != MediaKind::Scene {
                warn!(guid = %guid, kind = ?media.media_kind, "location scene is not scene media");
            }
            acc.lock()
                .expect("closure lock poisoned")
                .dependencies
                .insert(media);
        }
    }

    /// Add a scene-graph item: media directly, templates by expanding their
    /// dependency list. `path` holds the templates currently being expanded.
    fn add_item<'a>(
        &'a self,
        guid: ContentGuid,
        path: Vec<ContentGuid>,
        acc: &'a Mutex<Closure>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ()> {
        async move {
            let Some(entry) = self.fetch_soft(&guid, None, acc, cancel).await else {
                return;
            };
            match entry.as_ref() {
                ContentEntry::Media(media) => {
                    acc.lock()
                        .expect("closure lock poisoned")
                        .dependencies
                        .insert(media);
                }
                ContentEntry::Template(template) => {
                    let mut path = path;
                    path.push(guid.clone());
                    let mut next = Vec::new();
                    for dep in template.dependency_list() {
                        if path.contains(dep) {
                            record_cycle(acc, &guid, dep);
                        } else {
                            next.push(dep.clone());
                        }
                    }
                    join_all(
                        next.into_iter()
                            .map(|dep| self.add_item(dep, path.clone(), acc, cancel)),
                    )
                    .await;
                }
                other => {
                    let reason = format!("{} cannot be placed in a scene", other.kind());
                    record_missing(acc, &guid, reason);
                }
            }
        }
        .boxed()
    }

    async fn fetch_soft(
        &self,
        guid: &ContentGuid,
        kind: Option<EntryKind>,
        acc: &Mutex<Closure>,
        cancel: &CancellationToken,
    ) -> Option<Arc<ContentEntry>> {
        let fetched = match kind {
            Some(kind) => self.content.fetch_kind(guid, kind, cancel).await,
            None => self.content.fetch(guid, cancel).await,
        };
        match fetched {
            Ok(entry) => Some(entry),
            Err(e) => {
                record_missing(acc, guid, e.to_string());
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Verify
    // -----------------------------------------------------------------------

    async fn verify_all(self: Arc<Self>, local: Vec<MediaEntry>, tally: Arc<Mutex<Tally>>, cancel: &CancellationToken) {
        fan_out(local, |media, ticket| {
            let this = Arc::clone(&self);
            let tally = Arc::clone(&tally);
            let cancel = cancel.clone();
            async move {
                let payload = media.payload_id().to_string();
                let stale = !this.verify_one(&media, &cancel).await;
                let mut tally = tally.lock().expect("tally lock poisoned");
                if stale {
                    if !tally.to_download.contains(&payload) {
                        tally.to_download.push(payload);
                    }
                } else {
                    tally.verified.push(payload);
                }
                drop(tally);
                drop(ticket);
            }
        })
        .await;
    }

    /// Returns `true` when the local bundle is present and current. A stale
    /// file is deleted so the download does not skip it.
    async fn verify_one(&self, media: &MediaEntry, cancel: &CancellationToken) -> bool {
        let payload = media.payload_id();
        let path = self.layout.bundle_path(payload, self.platform);
        let expected = media.asset_data.expected_hash(self.platform);
        if expected.is_empty() {
            warn!(guid = %media.meta.guid, platform = %self.platform, "no hash published for platform");
        }
        match self.verifier.verify(&path, expected, cancel).await {
            Ok(VerifyOutcome::Match) => true,
            Ok(VerifyOutcome::Missing) => {
                debug!(payload, "bundle not cached");
                false
            }
            Ok(outcome) => {
                warn!(payload, path = %path.display(), ?outcome, "stale bundle, deleting");
                remove_stale(&path).await;
                false
            }
            Err(e) => {
                warn!(payload, error = %e, "verification failed");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Download
    // -----------------------------------------------------------------------

    async fn download_all(self: Arc<Self>, payloads: Vec<String>, tally: Arc<Mutex<Tally>>, cancel: &CancellationToken) {
        fan_out(payloads, |payload, ticket| {
            let this = Arc::clone(&self);
            let tally = Arc::clone(&tally);
            let cancel = cancel.clone();
            async move {
                let outcome = this.download_one(&payload, &cancel).await;
                let mut tally = tally.lock().expect("tally lock poisoned");
                match outcome {
                    Ok(path) => {
                        debug!(payload = %payload, path = %path.display(), "bundle downloaded");
                        tally.downloaded.push(payload);
                    }
                    Err(e) => {
                        warn!(payload = %payload, error = %e, "bundle download failed");
                        tally.failed.push(FailedDownload {
                            payload,
                            reason: e.to_string(),
                        });
                    }
                }
                drop(tally);
                drop(ticket);
            }
        })
        .await;
    }

    async fn download_one(&self, payload: &str, cancel: &CancellationToken) -> ResolveResult<PathBuf> {
        let url = self.payload_url(payload, cancel).await?;
        let dest = self.layout.bundle_path(payload, self.platform);
        Ok(self.transfer.download_large(&url, &dest, cancel).await?)
    }

    /// Download URL of `payload` for this platform. Absolute URLs are used as
    /// they are; GUIDs are looked up through `/Asset/{guid}`.
    async fn payload_url(&self, payload: &str, cancel: &CancellationToken) -> ResolveResult<String> {
        if is_http_url(payload) {
            return Ok(payload.to_string());
        }
        let url = self.endpoints.asset(&ContentGuid::new(payload));
        let paths: HashMap<String, String> = self.transfer.download_small(&url, cancel).await?;
        match paths.get(&self.platform.asset_path_key()) {
            Some(path) if !path.is_empty() => Ok(self.absolute(path)),
            _ => Err(ResolveError::NoPlatformAsset {
                payload: payload.to_string(),
                platform: self.platform,
            }),
        }
    }

    fn absolute(&self, path: &str) -> String {
        if is_http_url(path) {
            path.to_string()
        } else {
            format!("{}/{}", self.endpoints.base(), path.trim_start_matches('/'))
        }
    }
}

/// Spawn one task per item, each holding a barrier ticket, and wait until
/// every ticket has been returned. Dropping the returned future aborts the
/// tasks.
async fn fan_out<T, F, Fut>(items: Vec<T>, mut spawn: F)
where
    F: FnMut(T, BarrierTicket) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (barrier, signal) = CountingBarrier::with_signal(items.len());
    let barrier = Arc::new(barrier);
    let mut tasks = JoinSet::new();
    for item in items {
        tasks.spawn(spawn(item, barrier.ticket()));
    }
    drop(barrier);
    if signal.wait().await.is_err() {
        warn!("fan-out barrier abandoned");
    }
    while tasks.join_next().await.is_some() {}
}

fn record_missing(acc: &Mutex<Closure>, guid: &ContentGuid, reason: String) {
    warn!(guid = %guid, reason = %reason, "skipping unavailable dependency");
    let mut acc = acc.lock().expect("closure lock poisoned");
    if !acc.missing.iter().any(|m| &m.guid == guid) {
        acc.missing.push(MissingEntry {
            guid: guid.clone(),
            reason,
        });
    }
}

fn record_cycle(acc: &Mutex<Closure>, template: &ContentGuid, dependency: &ContentGuid) {
    warn!(template = %template, dependency = %dependency, "template cycle broken");
    let edge = CycleEdge {
        template: template.clone(),
        dependency: dependency.clone(),
    };
    let mut acc = acc.lock().expect("closure lock poisoned");
    if !acc.cycles.contains(&edge) {
        acc.cycles.push(edge);
    }
}

async fn remove_stale(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "cannot delete stale bundle"),
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::path::Path;
    use trove_crypto::ContentHasher;
    use trove_transfer::{MemoryTransport, TransferConfig, Transport};
    use trove_types::ContentMeta;

    const BASE: &str = "http://origin";

    struct Fixture {
        _dir: tempfile::TempDir,
        transport: Arc<MemoryTransport>,
        resolver: DependencyResolver,
        layout: BundleLayout,
    }

    fn bundle_bytes(payload: &str) -> Vec<u8> {
        format!("bundle:{payload}").into_bytes()
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let transport = Arc::new(MemoryTransport::new());
            let transfer = Arc::new(TransferQueue::spawn(
                Arc::clone(&transport) as Arc<dyn Transport>,
                TransferConfig::default(),
            ));
            let endpoints = Endpoints::new(BASE);
            let content = Arc::new(ContentCache::new(Arc::clone(&transfer), endpoints.clone()));
            let layout = BundleLayout::new(dir.path());
            let resolver = DependencyResolver::new(
                content,
                transfer,
                HashVerifier::new(),
                endpoints,
                layout.clone(),
                Platform::Linux,
            );
            Self {
                _dir: dir,
                transport,
                resolver,
                layout,
            }
        }

        fn entry(&self, value: Value) {
            let guid = value["guid"].as_str().unwrap().to_string();
            self.transport
                .insert_json(format!("{BASE}/ContentData/{guid}"), &value);
        }

        /// Publish a media entry, its asset map and its bundle bytes.
        fn media(&self, guid: &str, kind: &str, payload: &str) {
            let bytes = bundle_bytes(payload);
            self.entry(json!({
                "kind": "media",
                "guid": guid,
                "mediaKind": kind,
                "assetData": {
                    "downloadData": payload,
                    "assetHashDict": {"linux": ContentHasher::hash_bytes(&bytes)}
                }
            }));
            let file = format!("/files/{payload}_linux.bundle");
            self.transport
                .insert_json(format!("{BASE}/Asset/{payload}"), &json!({"linuxAssetPath": file}));
            self.transport.insert(format!("{BASE}{file}"), bytes);
        }

        fn template(&self, guid: &str, source: &str, deps: &[&str]) {
            self.entry(json!({
                "kind": "template",
                "guid": guid,
                "sourceContentDataEntryGuid": source,
                "moduleData": [{"moduleType": "generic", "dependencies": deps}]
            }));
        }

        fn environment(&self, scenes: &[&str], items: &[&str]) -> EnvironmentDataEntry {
            self.entry(json!({"kind": "location", "guid": "loc", "scenes": scenes}));
            let items: Vec<Value> = items.iter().map(|g| json!({"contentGuid": g})).collect();
            self.entry(json!({"kind": "sceneGraph", "guid": "sg", "sceneItems": items}));
            let env = json!({"kind": "environment", "guid": "env", "sceneGraph": "sg", "location": "loc"});
            self.entry(env);
            EnvironmentDataEntry {
                meta: ContentMeta::new(ContentGuid::new("env"), "env"),
                scene_graph: ContentGuid::new("sg"),
                location: ContentGuid::new("loc"),
                network_data: None,
            }
        }

        fn local(&self, payload: &str) -> PathBuf {
            self.layout.bundle_path(payload, Platform::Linux)
        }

        fn plant(&self, payload: &str, bytes: &[u8]) {
            let path = self.local(payload);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, bytes).unwrap();
        }

        async fn resolve(&self, env: &EnvironmentDataEntry) -> ResolveReport {
            self.resolver
                .resolve(env, &CancellationToken::new())
                .await
                .unwrap()
        }
    }

    fn sorted(mut v: Vec<&str>) -> Vec<&str> {
        v.sort_unstable();
        v
    }

    #[tokio::test]
    async fn closure_contains_scene_source_and_module_dependency() {
        let f = Fixture::new();
        f.media("A", "scene", "pA");
        f.media("M1", "model", "pM1");
        f.media("M2", "audio", "pM2");
        f.template("T", "M1", &["M2"]);
        let env = f.environment(&["A"], &["T"]);

        let report = f.resolve(&env).await;
        assert_eq!(sorted(report.payload_ids()), vec!["pA", "pM1", "pM2"]);
        assert!(report.is_complete());
        assert_eq!(report.downloaded.len(), 3);
        for p in ["pA", "pM1", "pM2"] {
            assert_eq!(std::fs::read(f.local(p)).unwrap(), bundle_bytes(p));
        }
    }

    #[tokio::test]
    async fn shared_payload_is_counted_once() {
        let f = Fixture::new();
        f.media("M1", "model", "shared");
        f.media("M1b", "model", "shared");
        f.template("T", "M1", &["M1b"]);
        let env = f.environment(&[], &["T", "M1", "M1b"]);

        let report = f.resolve(&env).await;
        assert_eq!(report.payload_ids(), vec!["shared"]);
        assert_eq!(report.to_download, vec!["shared".to_string()]);
    }

    #[tokio::test]
    async fn unchanged_files_are_never_redownloaded() {
        let f = Fixture::new();
        f.media("M1", "model", "p1");
        f.plant("p1", &bundle_bytes("p1"));
        let env = f.environment(&[], &["M1"]);

        for _ in 0..2 {
            let report = f.resolve(&env).await;
            assert_eq!(report.verified, vec!["p1".to_string()]);
            assert!(report.to_download.is_empty());
        }
        assert_eq!(f.transport.calls(&format!("{BASE}/Asset/p1")), 0);
    }

    #[tokio::test]
    async fn second_pass_after_download_verifies() {
        let f = Fixture::new();
        f.media("M1", "model", "p1");
        let env = f.environment(&[], &["M1"]);

        let first = f.resolve(&env).await;
        assert_eq!(first.downloaded, vec!["p1".to_string()]);
        let second = f.resolve(&env).await;
        assert_eq!(second.verified, vec!["p1".to_string()]);
        assert!(second.to_download.is_empty());
        assert_eq!(f.transport.calls(&format!("{BASE}/Asset/p1")), 1);
    }

    #[tokio::test]
    async fn stale_file_is_replaced_once() {
        let f = Fixture::new();
        f.media("M1", "model", "p1");
        f.plant("p1", b"outdated bytes");
        let env = f.environment(&[], &["M1", "M1"]);

        let report = f.resolve(&env).await;
        assert_eq!(report.to_download, vec!["p1".to_string()]);
        assert_eq!(report.downloaded, vec!["p1".to_string()]);
        assert_eq!(std::fs::read(f.local("p1")).unwrap(), bundle_bytes("p1"));
    }

    #[tokio::test]
    async fn missing_entries_are_reported_and_skipped() {
        let f = Fixture::new();
        f.media("M1", "model", "p1");
        let env = f.environment(&["ghost-scene"], &["M1", "ghost-item"]);

        let report = f.resolve(&env).await;
        assert_eq!(report.payload_ids(), vec!["p1"]);
        let missing: Vec<&str> = report.missing.iter().map(|m| m.guid.as_str()).collect();
        assert_eq!(sorted(missing), vec!["ghost-item", "ghost-scene"]);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn template_cycles_are_broken() {
        let f = Fixture::new();
        f.media("M1", "model", "p1");
        f.media("M2", "model", "p2");
        f.template("T1", "M1", &["T2"]);
        f.template("T2", "M2", &["T1"]);
        let env = f.environment(&[], &["T1"]);

        let report = f.resolve(&env).await;
        assert_eq!(sorted(report.payload_ids()), vec!["p1", "p2"]);
        assert_eq!(
            report.cycles,
            vec![CycleEdge {
                template: ContentGuid::new("T2"),
                dependency: ContentGuid::new("T1"),
            }]
        );
    }

    #[tokio::test]
    async fn self_referencing_template_terminates() {
        let f = Fixture::new();
        f.media("M1", "model", "p1");
        f.template("T", "M1", &["T"]);
        let env = f.environment(&[], &["T"]);

        let report = f.resolve(&env).await;
        assert_eq!(report.payload_ids(), vec!["p1"]);
        assert_eq!(report.cycles.len(), 1);
    }

    #[tokio::test]
    async fn empty_environment_completes_immediately() {
        let f = Fixture::new();
        let env = f.environment(&[], &[]);
        let report = f.resolve(&env).await;
        assert!(report.dependencies.is_empty());
        assert!(report.is_complete());
        assert_eq!(f.transport.sent().len(), 0);
    }

    #[tokio::test]
    async fn video_is_streamed_not_cached() {
        let f = Fixture::new();
        f.entry(json!({
            "kind": "media", "guid": "V", "mediaKind": "video",
            "assetData": {"downloadData": "https://cdn/v.mp4"}
        }));
        let env = f.environment(&[], &["V"]);
        let report = f.resolve(&env).await;
        assert_eq!(report.streamed, vec!["https://cdn/v.mp4".to_string()]);
        assert!(report.to_download.is_empty());
    }

    #[tokio::test]
    async fn url_payloads_download_directly() {
        let f = Fixture::new();
        let payload = "https://cdn.example.com/m.bundle";
        f.entry(json!({
            "kind": "media", "guid": "M", "mediaKind": "model",
            "assetData": {"downloadData": payload}
        }));
        f.transport.insert(payload, b"direct".to_vec());
        let env = f.environment(&[], &["M"]);

        let report = f.resolve(&env).await;
        assert_eq!(report.downloaded, vec![payload.to_string()]);
        assert_eq!(std::fs::read(f.local(payload)).unwrap(), b"direct");
    }

    #[tokio::test]
    async fn similar_url_payloads_keep_separate_files() {
        let f = Fixture::new();
        let slash = "https://cdn/a/b";
        let underscore = "https://cdn/a_b";
        for (guid, payload, bytes) in [("M1", slash, b"slash".as_slice()), ("M2", underscore, b"underscore".as_slice())] {
            f.entry(json!({
                "kind": "media", "guid": guid, "mediaKind": "model",
                "assetData": {
                    "downloadData": payload,
                    "assetHashDict": {"linux": ContentHasher::hash_bytes(bytes)}
                }
            }));
            f.transport.insert(payload, bytes.to_vec());
        }
        let env = f.environment(&[], &["M1", "M2"]);
        assert_ne!(f.local(slash), f.local(underscore));

        let first = f.resolve(&env).await;
        assert_eq!(sorted(first.downloaded.iter().map(String::as_str).collect()), vec![slash, underscore]);
        assert_eq!(std::fs::read(f.local(slash)).unwrap(), b"slash");
        assert_eq!(std::fs::read(f.local(underscore)).unwrap(), b"underscore");

        let second = f.resolve(&env).await;
        assert!(second.downloaded.is_empty());
        assert_eq!(sorted(second.verified.iter().map(String::as_str).collect()), vec![slash, underscore]);
        assert_eq!(f.transport.calls(slash), 1);
        assert_eq!(f.transport.calls(underscore), 1);
    }

    #[tokio::test]
    async fn failed_download_does_not_stop_siblings() {
        let f = Fixture::new();
        f.media("M1", "model", "p1");
        f.media("M2", "model", "p2");
        f.transport
            .insert_json(format!("{BASE}/Asset/p2"), &json!({"iosAssetPath": "/files/x"}));
        let env = f.environment(&[], &["M1", "M2"]);

        let report = f.resolve(&env).await;
        assert_eq!(report.downloaded, vec!["p1".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].payload, "p2");
        assert!(Path::new(&f.local("p1")).exists());
    }

    #[tokio::test]
    async fn prepare_environment_fetches_the_entry() {
        let f = Fixture::new();
        f.media("A", "scene", "pA");
        f.environment(&["A"], &[]);
        let report = f
            .resolver
            .prepare_environment(&ContentGuid::new("env"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.environment.as_str(), "env");
        assert_eq!(report.payload_ids(), vec!["pA"]);
    }

    #[tokio::test]
    async fn prepare_rejects_non_environment() {
        let f = Fixture::new();
        f.media("A", "scene", "pA");
        let err = f
            .resolver
            .prepare_environment(&ContentGuid::new("A"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Environment { .. }));
    }

    #[tokio::test]
    async fn closure_only_touches_nothing_on_disk() {
        let f = Fixture::new();
        f.media("M1", "model", "p1");
        let env = f.environment(&[], &["M1"]);
        let report = f
            .resolver
            .closure(&env, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.payload_ids(), vec!["p1"]);
        assert!(!f.local("p1").exists());
    }

    #[tokio::test]
    async fn cancelled_resolution_returns_cancelled() {
        let f = Fixture::new();
        let env = f.environment(&[], &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = f.resolver.resolve(&env, &cancel).await.unwrap_err();
        assert_eq!(err, ResolveError::Cancelled);
    }
}
