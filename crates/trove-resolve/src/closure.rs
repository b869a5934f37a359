use std::collections::HashSet;

use trove_types::MediaEntry;

/// Media entries keyed by payload identity.
///
/// Two entries whose `downloadData` is the same binary count once, whatever
/// their GUIDs. Entries without a payload fall back to their GUID.
#[derive(Clone, Debug, Default)]
pub struct DependencySet {
    seen: HashSet<String>,
    entries: Vec<MediaEntry>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `media` unless its payload is already present. Returns whether it
    /// was added.
    pub fn insert(&mut self, media: &MediaEntry) -> bool {
        if !self.seen.insert(identity(media)) {
            return false;
        }
        self.entries.push(media.clone());
        true
    }

    /// Entries in first-insertion order.
    pub fn into_vec(self) -> Vec<MediaEntry> {
        self.entries
    }
}

fn identity(media: &MediaEntry) -> String {
    match media.payload_id() {
        "" => format!("guid:{}", media.meta.guid),
        payload => payload.to_string(),
    }
}
