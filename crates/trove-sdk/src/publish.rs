use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use trove_types::{ContentGuid, Platform};

/// A platform bundle to upload for a media entry.
#[derive(Clone, Debug)]
pub struct BundleUpload {
    pub guid: ContentGuid,
    pub platform: Platform,
    pub path: PathBuf,
}

impl BundleUpload {
    pub fn new(guid: ContentGuid, platform: Platform, path: impl Into<PathBuf>) -> Self {
        Self {
            guid,
            platform,
            path: path.into(),
        }
    }
}

/// Server acknowledgement of an uploaded bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedBundle {
    pub guid: ContentGuid,
    pub platform: Platform,
    pub hash: String,
    #[serde(default)]
    pub asset_path: String,
    #[serde(default)]
    pub bytes: u64,
    /// Platforms the server still has no bundle for.
    #[serde(default)]
    pub missing_platforms: Vec<Platform>,
}
