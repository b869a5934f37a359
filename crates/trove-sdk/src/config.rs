use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trove_transfer::{Endpoints, TransferConfig};
use trove_types::{BundleLayout, Platform, DEFAULT_BUNDLE_EXTENSION};

use crate::error::{SdkError, SdkResult};

/// Client configuration, usually read from `trove.toml`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TroveConfig {
    /// Origin serving `/ContentData` and `/Asset`.
    pub base_url: String,
    /// Root of the local bundle cache.
    pub cache_root: PathBuf,
    pub platform: Platform,
    /// Bearer token sent with every request when set.
    pub auth_token: Option<String>,
    pub bundle_extension: String,
    pub transfer: TransferConfig,
}

impl Default for TroveConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7878".into(),
            cache_root: PathBuf::from(".trove"),
            platform: Platform::current(),
            auth_token: None,
            bundle_extension: DEFAULT_BUNDLE_EXTENSION.into(),
            transfer: TransferConfig::default(),
        }
    }
}

impl TroveConfig {
    pub fn new(base_url: impl Into<String>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.base_url.clone())
    }

    pub fn layout(&self) -> BundleLayout {
        BundleLayout::new(self.cache_root.clone()).with_extension(self.bundle_extension.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml() {
        let c = TroveConfig::from_toml_str(
            r#"
            base_url = "https://content.example.com"
            platform = "webgl"

            [transfer]
            max_retry_count = 4
            "#,
        )
        .unwrap();
        assert_eq!(c.platform, Platform::Webgl);
        assert_eq!(c.transfer.max_attempts(), 5);
        assert_eq!(c.transfer.decode_concurrency, 4);
        assert_eq!(c.bundle_extension, "bundle");
    }

    #[test]
    fn unknown_platform_is_a_config_error() {
        let err = TroveConfig::from_toml_str(r#"platform = "dreamcast""#).unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn layout_uses_extension() {
        let c = TroveConfig {
            bundle_extension: ".unity3d".into(),
            ..TroveConfig::new("http://o", "/cache")
        };
        assert_eq!(
            c.layout().bundle_path("g", Platform::Ios),
            PathBuf::from("/cache/AssetBundles/g_ios.unity3d")
        );
    }
}
