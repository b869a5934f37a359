use std::path::{Path, PathBuf};

use crate::platform::Platform;

/// Directory under the cache root that holds platform bundles.
pub const BUNDLE_DIR: &str = "AssetBundles";

pub const DEFAULT_BUNDLE_EXTENSION: &str = "bundle";

/// Local cache layout: `{cache_root}/AssetBundles/{payload}_{platform}.{ext}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleLayout {
    cache_root: PathBuf,
    extension: String,
}

impl BundleLayout {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            extension: DEFAULT_BUNDLE_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let ext: String = extension.into();
        self.extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.cache_root.join(BUNDLE_DIR)
    }

    /// Expected local path of the bundle for `payload_id` on `platform`.
    pub fn bundle_path(&self, payload_id: &str, platform: Platform) -> PathBuf {
        self.bundle_dir().join(self.file_name(payload_id, platform))
    }

    pub fn file_name(&self, payload_id: &str, platform: Platform) -> String {
        format!(
            "{}_{}.{}",
            payload_stem(payload_id),
            platform.as_str(),
            self.extension
        )
    }
}

/// Filesystem-safe stem for a payload id.
///
/// ASCII alphanumerics, `-` and `.` pass through. Every other byte,
/// including `_`, becomes `_XX` (upper-case hex), so distinct ids always
/// map to distinct stems and the `_` before the platform stays unambiguous.
pub fn payload_stem(payload_id: &str) -> String {
    let mut stem = String::with_capacity(payload_id.len());
    for byte in payload_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{byte:02X}"));
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn bundle_path_layout() {
        let layout = BundleLayout::new("/cache");
        let path = layout.bundle_path("abc-123", Platform::Android);
        assert_eq!(
            path,
            PathBuf::from("/cache/AssetBundles/abc-123_android.bundle")
        );
    }

    #[test]
    fn custom_extension_drops_leading_dot() {
        let layout = BundleLayout::new("/c").with_extension(".unity3d");
        assert_eq!(layout.file_name("g", Platform::Ios), "g_ios.unity3d");
    }

    #[test]
    fn url_payloads_are_escaped() {
        assert_eq!(
            payload_stem("https://cdn.example.com/a?x=1"),
            "https_3A_2F_2Fcdn.example.com_2Fa_3Fx_3D1"
        );
        assert_eq!(payload_stem("0190a1b2-c3d4"), "0190a1b2-c3d4");
        assert_eq!(payload_stem("guid_1"), "guid_5F1");
    }

    #[test]
    fn distinct_payloads_never_share_a_file() {
        let layout = BundleLayout::new("/c");
        let ids = [
            "https://cdn/a/b",
            "https://cdn/a_b",
            "http://cdn/a/b",
            "https_3A_2F_2Fcdn_2Fa_2Fb",
            "a_b",
            "a/b",
        ];
        let paths: HashSet<PathBuf> = ids
            .iter()
            .map(|id| layout.bundle_path(id, Platform::Linux))
            .collect();
        assert_eq!(paths.len(), ids.len());
    }

    #[test]
    fn platforms_map_to_distinct_files() {
        let layout = BundleLayout::new("/c");
        let a = layout.bundle_path("g", Platform::Ios);
        let b = layout.bundle_path("g", Platform::Webgl);
        assert_ne!(a, b);
    }
}
