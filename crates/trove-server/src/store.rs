use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use trove_crypto::ContentHasher;
use trove_types::{BundleLayout, ContentEntry, ContentGuid, EntryKind, Platform};

use crate::error::{ServerError, ServerResult};

const CONTENT_DIR: &str = "content";
const ASSET_DIR: &str = "assets";
const FILE_DIR: &str = "files";

/// Result of storing an uploaded bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBundle {
    pub guid: ContentGuid,
    pub platform: Platform,
    pub hash: String,
    pub asset_path: String,
    pub bytes: u64,
    /// Platforms the media entry still has no hash for.
    pub missing_platforms: Vec<Platform>,
}

/// Directory-backed store.
///
/// ```text
/// {root}/content/{guid}.json     content entries
/// {root}/assets/{payload}.json   {"<platform>AssetPath": "/files/<name>"}
/// {root}/files/<name>            bundle bytes
/// ```
pub struct DirStore {
    root: PathBuf,
    layout: BundleLayout,
    // Serializes read-modify-write cycles on entries and asset maps.
    write_lock: Mutex<()>,
}

impl DirStore {
    pub fn open(root: impl Into<PathBuf>) -> ServerResult<Self> {
        let root = root.into();
        for dir in [CONTENT_DIR, ASSET_DIR, FILE_DIR] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        info!(root = %root.display(), "store opened");
        Ok(Self {
            layout: BundleLayout::new(root.clone()),
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ---- Content entries ----

    pub async fn get_entry(&self, guid: &str) -> ServerResult<Value> {
        let path = self.entry_path(guid)?;
        read_json(&path)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("content {guid}")))
    }

    /// Every stored entry whose kind is in `kinds`, or all entries when
    /// `kinds` is empty. Sorted by GUID.
    pub async fn list_entries(&self, kinds: &[EntryKind]) -> ServerResult<Vec<Value>> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join(CONTENT_DIR)).await?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") {
                names.push(item.path());
            }
        }
        names.sort();

        let mut out = Vec::new();
        for path in names {
            let Some(value) = read_json(&path).await? else {
                continue;
            };
            let entry = ContentEntry::from_value(value.clone())?;
            if kinds.is_empty() || kinds.contains(&entry.kind()) {
                out.push(value);
            }
        }
        Ok(out)
    }

    /// Validate and store an entry, minting a GUID when it has none.
    /// Returns the canonical JSON that was written.
    pub async fn put_entry(&self, mut entry: ContentEntry) -> ServerResult<Value> {
        if entry.guid().is_empty() {
            entry.meta_mut().guid = ContentGuid::generate();
        }
        let guid = entry.guid().clone();
        let path = self.entry_path(guid.as_str())?;
        let value = to_value(&entry)?;
        let _lock = self.write_lock.lock().await;
        write_json(&path, &value).await?;
        debug!(guid = %guid, kind = %entry.kind(), "entry stored");
        Ok(value)
    }

    // ---- Asset maps and bundles ----

    pub async fn asset_map(&self, payload: &str) -> ServerResult<BTreeMap<String, String>> {
        let path = self.asset_path(payload)?;
        match read_json(&path).await? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| ServerError::Internal(format!("asset map {payload}: {e}"))),
            None => Err(ServerError::NotFound(format!("asset {payload}"))),
        }
    }

    /// Store bundle bytes for media `guid` on `platform`.
    ///
    /// The file is keyed by the media entry's payload id (its GUID when the
    /// entry has no payload yet). The entry's hash for the platform and the
    /// payload's asset map are updated to point at the new file.
    pub async fn put_bundle(
        &self,
        guid: &str,
        platform: Platform,
        data: Vec<u8>,
    ) -> ServerResult<StoredBundle> {
        let _lock = self.write_lock.lock().await;

        let value = self.get_entry(guid).await?;
        let mut entry = ContentEntry::from_value(value)?;
        let ContentEntry::Media(media) = &mut entry else {
            return Err(ServerError::BadRequest(format!("{guid} is not a media entry")));
        };
        if media.asset_data.download_data.is_empty() {
            media.asset_data.download_data = guid.to_string();
        }
        let payload = media.asset_data.download_data.clone();

        let file_name = self.layout.file_name(&payload, platform);
        checked_name(&file_name)?;
        let hash = ContentHasher::hash_bytes(&data);
        let bytes = data.len() as u64;
        tokio::fs::write(self.root.join(FILE_DIR).join(&file_name), &data).await?;

        media.asset_data.set_hash(platform, hash.clone());
        let missing_platforms = media.missing_hashes(&Platform::ALL);
        write_json(&self.entry_path(guid)?, &to_value(&entry)?).await?;

        let asset_path = format!("/files/{file_name}");
        let map_path = self.asset_path(&payload)?;
        let mut map: BTreeMap<String, String> = match read_json(&map_path).await? {
            Some(v) => serde_json::from_value(v).unwrap_or_default(),
            None => BTreeMap::new(),
        };
        map.insert(platform.asset_path_key(), asset_path.clone());
        write_json(&map_path, &to_value(&map)?).await?;

        info!(guid, %platform, bytes, hash = %hash, "bundle stored");
        if !missing_platforms.is_empty() {
            warn!(guid, missing = ?missing_platforms, "media still lacks bundles for some platforms");
        }
        Ok(StoredBundle {
            guid: ContentGuid::new(guid),
            platform,
            hash,
            asset_path,
            bytes,
            missing_platforms,
        })
    }

    pub async fn read_file(&self, name: &str) -> ServerResult<Vec<u8>> {
        checked_name(name)?;
        match tokio::fs::read(self.root.join(FILE_DIR).join(name)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ServerError::NotFound(format!("file {name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn entry_path(&self, guid: &str) -> ServerResult<PathBuf> {
        checked_name(guid)?;
        Ok(self.root.join(CONTENT_DIR).join(format!("{guid}.json")))
    }

    fn asset_path(&self, payload: &str) -> ServerResult<PathBuf> {
        checked_name(payload)?;
        Ok(self.root.join(ASSET_DIR).join(format!("{payload}.json")))
    }
}

/// Reject names that could escape the store directories.
fn checked_name(name: &str) -> ServerResult<&str> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(name)
    } else {
        Err(ServerError::BadRequest(format!("invalid name: {name:?}")))
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> ServerResult<Value> {
    serde_json::to_value(value).map_err(|e| ServerError::Internal(e.to_string()))
}

async fn read_json(path: &Path) -> ServerResult<Option<Value>> {
    match tokio::fs::read(path).await {
        Ok(data) => serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| ServerError::Internal(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json(path: &Path, value: &Value) -> ServerResult<()> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| ServerError::Internal(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, DirStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn media(guid: &str) -> ContentEntry {
        ContentEntry::from_value(json!({"kind": "media", "guid": guid, "mediaKind": "model"})).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_entry() {
        let (_dir, store) = store();
        let stored = store.put_entry(media("m1")).await.unwrap();
        assert_eq!(stored["kind"], "media");
        let read = store.get_entry("m1").await.unwrap();
        assert_eq!(read, stored);
    }

    #[tokio::test]
    async fn missing_entry_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.get_entry("nope").await, Err(ServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let (_dir, store) = store();
        assert!(matches!(store.get_entry("../etc").await, Err(ServerError::BadRequest(_))));
        assert!(matches!(store.read_file(".hidden").await, Err(ServerError::BadRequest(_))));
    }

    #[tokio::test]
    async fn empty_guid_is_minted() {
        let (_dir, store) = store();
        let entry = ContentEntry::from_value(json!({"kind": "location", "scenes": []})).unwrap();
        let stored = store.put_entry(entry).await.unwrap();
        let guid = stored["guid"].as_str().unwrap();
        assert!(!guid.is_empty());
        assert!(store.get_entry(guid).await.is_ok());
    }

    #[tokio::test]
    async fn list_filters_by_kind() {
        let (_dir, store) = store();
        store.put_entry(media("m1")).await.unwrap();
        store
            .put_entry(ContentEntry::from_value(json!({"kind": "location", "guid": "loc"})).unwrap())
            .await
            .unwrap();

        assert_eq!(store.list_entries(&[]).await.unwrap().len(), 2);
        let media_only = store.list_entries(&[EntryKind::Media]).await.unwrap();
        assert_eq!(media_only.len(), 1);
        assert_eq!(media_only[0]["guid"], "m1");
    }

    #[tokio::test]
    async fn bundle_upload_records_hash_and_asset_path() {
        let (_dir, store) = store();
        store.put_entry(media("m1")).await.unwrap();

        let stored = store.put_bundle("m1", Platform::Ios, b"bundle".to_vec()).await.unwrap();
        assert_eq!(stored.hash, ContentHasher::hash_bytes(b"bundle"));
        assert_eq!(stored.asset_path, "/files/m1_ios.bundle");

        let entry = store.get_entry("m1").await.unwrap();
        assert_eq!(entry["assetData"]["downloadData"], "m1");
        assert_eq!(entry["assetData"]["assetHashDict"]["ios"], stored.hash);

        let map = store.asset_map("m1").await.unwrap();
        assert_eq!(map.get("iosAssetPath").unwrap(), "/files/m1_ios.bundle");
        assert_eq!(store.read_file("m1_ios.bundle").await.unwrap(), b"bundle");
    }

    #[tokio::test]
    async fn bundle_upload_reports_platforms_still_missing() {
        let (_dir, store) = store();
        store.put_entry(media("m1")).await.unwrap();

        let first = store.put_bundle("m1", Platform::Ios, b"a".to_vec()).await.unwrap();
        assert_eq!(first.missing_platforms.len(), Platform::ALL.len() - 1);
        assert!(!first.missing_platforms.contains(&Platform::Ios));

        for platform in Platform::ALL {
            store.put_bundle("m1", platform, b"b".to_vec()).await.unwrap();
        }
        let last = store.put_bundle("m1", Platform::Linux, b"c".to_vec()).await.unwrap();
        assert!(last.missing_platforms.is_empty());

        store
            .put_entry(
                ContentEntry::from_value(json!({"kind": "media", "guid": "v1", "mediaKind": "video"}))
                    .unwrap(),
            )
            .await
            .unwrap();
        let video = store.put_bundle("v1", Platform::Ios, b"v".to_vec()).await.unwrap();
        assert!(video.missing_platforms.is_empty());
    }

    #[tokio::test]
    async fn bundle_for_non_media_is_rejected() {
        let (_dir, store) = store();
        store
            .put_entry(ContentEntry::from_value(json!({"kind": "location", "guid": "loc"})).unwrap())
            .await
            .unwrap();
        let err = store.put_bundle("loc", Platform::Ios, vec![1]).await.unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }
}
