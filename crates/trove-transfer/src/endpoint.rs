use trove_types::{ContentGuid, EntryKind, Platform};

/// Route segments served by a Trove origin.
pub mod paths {
    pub const CONTENT_DATA: &str = "ContentData";
    pub const ASSET: &str = "Asset";
    pub const FILES: &str = "files";
    pub const HEALTH: &str = "health";
}

/// URL builder for a Trove origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `GET|PUT {base}/ContentData/{guid}`
    pub fn content_data(&self, guid: &ContentGuid) -> String {
        format!("{}/{}/{}", self.base, paths::CONTENT_DATA, guid)
    }

    /// `GET|POST {base}/ContentData`
    pub fn content_data_collection(&self) -> String {
        format!("{}/{}", self.base, paths::CONTENT_DATA)
    }

    /// `GET {base}/ContentData?types=a,b`; an empty filter asks for everything.
    pub fn content_data_query(&self, kinds: &[EntryKind]) -> String {
        if kinds.is_empty() {
            return self.content_data_collection();
        }
        let types: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        format!("{}?types={}", self.content_data_collection(), types.join(","))
    }

    /// `GET {base}/Asset/{guid}`: per-platform download locations for a media entry.
    pub fn asset(&self, guid: &ContentGuid) -> String {
        format!("{}/{}/{}", self.base, paths::ASSET, guid)
    }

    /// `POST {base}/Asset/{guid}/{platform}`: multipart bundle upload.
    pub fn asset_upload(&self, guid: &ContentGuid, platform: Platform) -> String {
        format!("{}/{}/{}/{}", self.base, paths::ASSET, guid, platform.as_str())
    }

    pub fn file(&self, name: &str) -> String {
        format!("{}/{}/{}", self.base, paths::FILES, name)
    }

    pub fn health(&self) -> String {
        format!("{}/{}", self.base, paths::HEALTH)
    }
}
