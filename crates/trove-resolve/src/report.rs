use serde::Serialize;
use trove_types::{ContentGuid, MediaEntry};

/// A referenced GUID that could not be used during resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MissingEntry {
    pub guid: ContentGuid,
    pub reason: String,
}

/// A template dependency pointing back at a template already being expanded.
/// The edge is dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CycleEdge {
    pub template: ContentGuid,
    pub dependency: ContentGuid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedDownload {
    pub payload: String,
    pub reason: String,
}

/// Outcome of preparing one environment.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub environment: ContentGuid,
    /// The dependency closure, one entry per payload.
    pub dependencies: Vec<MediaEntry>,
    /// Payloads whose local bundle matched the expected hash.
    pub verified: Vec<String>,
    /// Payloads streamed rather than cached (video, or no payload at all).
    pub streamed: Vec<String>,
    /// Payloads that were missing or stale locally.
    pub to_download: Vec<String>,
    pub downloaded: Vec<String>,
    pub failed: Vec<FailedDownload>,
    pub missing: Vec<MissingEntry>,
    pub cycles: Vec<CycleEdge>,
}

impl ResolveReport {
    pub fn payload_ids(&self) -> Vec<&str> {
        self.dependencies.iter().map(|m| m.payload_id()).collect()
    }

    /// Every dependency was found and every needed download succeeded.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }
}
