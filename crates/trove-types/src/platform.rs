use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Target platform a bundle was built for.
///
/// Bundles are platform specific: the same payload GUID maps to a different
/// file, a different hash, and a different download URL per platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Windows,
    Webgl,
    Macos,
    Linux,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Ios,
        Platform::Android,
        Platform::Windows,
        Platform::Webgl,
        Platform::Macos,
        Platform::Linux,
    ];

    /// The platform this process is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_arch = "wasm32") {
            Platform::Webgl
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Windows => "windows",
            Platform::Webgl => "webgl",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
        }
    }

    /// Key under which the asset endpoint publishes this platform's bundle URL.
    pub fn asset_path_key(&self) -> String {
        format!("{}AssetPath", self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| TypeError::UnknownPlatform(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("WebGL".parse::<Platform>().unwrap(), Platform::Webgl);
        assert_eq!("ios".parse::<Platform>().unwrap(), Platform::Ios);
    }

    #[test]
    fn parse_unknown_platform() {
        let err = "playstation".parse::<Platform>().unwrap_err();
        assert_eq!(err, TypeError::UnknownPlatform("playstation".into()));
    }

    #[test]
    fn asset_path_key_format() {
        assert_eq!(Platform::Android.asset_path_key(), "androidAssetPath");
        assert_eq!(Platform::Windows.asset_path_key(), "windowsAssetPath");
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Platform::Webgl).unwrap();
        assert_eq!(json, "\"webgl\"");
        for p in Platform::ALL {
            let parsed: Platform =
                serde_json::from_str(&format!("\"{}\"", p.as_str())).unwrap();
            assert_eq!(parsed, p);
        }
    }
}
