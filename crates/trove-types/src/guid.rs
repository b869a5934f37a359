use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a content entry or a binary payload.
///
/// GUIDs are assigned by the server or minted client-side by editing tools.
/// Trove never interprets their contents; two GUIDs are equal only if their
/// strings are equal.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentGuid(String);

impl ContentGuid {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh client-side identifier (UUID v7, time ordered).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// The empty GUID. Fetching it is always an error.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines (first 8 characters).
    pub fn short_id(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Debug for ContentGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentGuid({})", self.0)
    }
}

impl fmt::Display for ContentGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentGuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContentGuid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ContentGuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_guids_are_unique() {
        let a = ContentGuid::generate();
        let b = ContentGuid::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn whitespace_guid_is_empty() {
        assert!(ContentGuid::empty().is_empty());
        assert!(ContentGuid::new("   ").is_empty());
        assert!(!ContentGuid::new("a").is_empty());
    }

    #[test]
    fn short_id_truncates() {
        let g = ContentGuid::new("0123456789abcdef");
        assert_eq!(g.short_id(), "01234567");
        assert_eq!(ContentGuid::new("abc").short_id(), "abc");
    }

    #[test]
    fn serde_is_transparent() {
        let g = ContentGuid::new("scene-1");
        let json = serde_json::to_string(&g).unwrap();
        assert_eq!(json, "\"scene-1\"");
        let parsed: ContentGuid = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, g);
    }
}
