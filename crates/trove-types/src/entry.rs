//! Typed content entries.
//!
//! Every entry shares the [`ContentMeta`] base shape and is one of a closed
//! set of variants. On the wire an entry carries an explicit `"kind"` tag;
//! payloads produced by older tooling omit it, in which case the variant is
//! inferred from the payload's structural shape.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::TypeError;
use crate::guid::ContentGuid;
use crate::platform::Platform;
use crate::template::TemplateDataEntry;

// ---------------------------------------------------------------------------
// Base shape
// ---------------------------------------------------------------------------

/// Fields shared by every content entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMeta {
    #[serde(default)]
    pub guid: ContentGuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub creation_time: DateTime<Utc>,
    /// Tag of the tool version that produced the entry.
    #[serde(default)]
    pub producer_version: String,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl ContentMeta {
    pub fn new(guid: ContentGuid, name: impl Into<String>) -> Self {
        Self {
            guid,
            name: name.into(),
            description: String::new(),
            creation_time: Utc::now(),
            producer_version: String::new(),
            expiration: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Scene,
    Model,
    Video,
    Audio,
    Image,
    #[default]
    None,
}

impl MediaKind {
    /// Video payloads are streamed directly and never land in the bundle cache.
    pub fn has_local_bundle(&self) -> bool {
        !matches!(self, MediaKind::Video)
    }
}

/// Binary payload reference plus the per-platform bundle hashes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetData {
    /// GUID or URL identifying the binary payload.
    #[serde(default)]
    pub download_data: String,
    /// Platform name to content hash of that platform's bundle file.
    #[serde(default)]
    pub asset_hash_dict: BTreeMap<String, String>,
}

impl AssetData {
    pub fn new(download_data: impl Into<String>) -> Self {
        Self {
            download_data: download_data.into(),
            asset_hash_dict: BTreeMap::new(),
        }
    }

    /// Expected hash for `platform`, or `""` when the server declared none.
    pub fn expected_hash(&self, platform: Platform) -> &str {
        self.asset_hash_dict
            .get(platform.as_str())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set_hash(&mut self, platform: Platform, hash: impl Into<String>) {
        self.asset_hash_dict
            .insert(platform.as_str().to_string(), hash.into());
    }

    /// Platforms in `required` that have no declared hash.
    pub fn missing_platforms(&self, required: &[Platform]) -> Vec<Platform> {
        required
            .iter()
            .copied()
            .filter(|p| !self.asset_hash_dict.contains_key(p.as_str()))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    #[serde(flatten)]
    pub meta: ContentMeta,
    #[serde(default)]
    pub media_kind: MediaKind,
    #[serde(default)]
    pub asset_data: AssetData,
    /// Producer-side provenance. Unused at runtime.
    #[serde(default)]
    pub original_source: Option<String>,
    #[serde(default)]
    pub extension: String,
}

impl MediaEntry {
    pub fn new(guid: ContentGuid, media_kind: MediaKind, download_data: impl Into<String>) -> Self {
        let name = guid.to_string();
        Self {
            meta: ContentMeta::new(guid, name),
            media_kind,
            asset_data: AssetData::new(download_data),
            original_source: None,
            extension: String::new(),
        }
    }

    /// Payload identity used to deduplicate the dependency closure.
    pub fn payload_id(&self) -> &str {
        &self.asset_data.download_data
    }

    /// Whether the payload must be present in the local bundle cache.
    pub fn requires_local_bundle(&self) -> bool {
        self.media_kind.has_local_bundle() && !self.asset_data.download_data.is_empty()
    }

    /// Platforms missing a hash. Video media never needs one.
    pub fn missing_hashes(&self, required: &[Platform]) -> Vec<Platform> {
        if !self.media_kind.has_local_bundle() {
            return Vec::new();
        }
        self.asset_data.missing_platforms(required)
    }
}

// ---------------------------------------------------------------------------
// Scene graph / location / environment
// ---------------------------------------------------------------------------

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

/// A placed item in a scene graph. `content_guid` references a media or
/// template entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredItemEntry {
    pub content_guid: ContentGuid,
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
}

impl ConfiguredItemEntry {
    pub fn at_origin(content_guid: ContentGuid) -> Self {
        Self {
            content_guid,
            position: [0.0; 3],
            rotation: identity_rotation(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGraphEntry {
    #[serde(flatten)]
    pub meta: ContentMeta,
    #[serde(default)]
    pub scene_items: Vec<ConfiguredItemEntry>,
}

/// A location: the list of scene media rendered as the backdrop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDataEntry {
    #[serde(flatten)]
    pub meta: ContentMeta,
    /// Each GUID must reference a media entry of kind [`MediaKind::Scene`].
    #[serde(default)]
    pub scenes: Vec<ContentGuid>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDataEntry {
    #[serde(flatten)]
    pub meta: ContentMeta,
    #[serde(default)]
    pub scene_graph: ContentGuid,
    #[serde(default)]
    pub location: ContentGuid,
    /// Opaque to the content pipeline.
    #[serde(default)]
    pub network_data: Option<Value>,
}

// ---------------------------------------------------------------------------
// EntryKind
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    Media,
    Template,
    SceneGraph,
    Location,
    Environment,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Media => "media",
            EntryKind::Template => "template",
            EntryKind::SceneGraph => "sceneGraph",
            EntryKind::Location => "location",
            EntryKind::Environment => "environment",
        }
    }

    /// Infer the variant of an untagged payload from the fields it carries.
    pub fn infer(value: &Value) -> Result<Self, TypeError> {
        let Some(map) = value.as_object() else {
            return Err(TypeError::UnrecognizedShape);
        };
        let has = |key: &str| map.contains_key(key);
        if has("sceneItems") {
            Ok(EntryKind::SceneGraph)
        } else if has("sceneGraph") {
            Ok(EntryKind::Environment)
        } else if has("scenes") {
            Ok(EntryKind::Location)
        } else if has("sourceContentDataEntryGuid") || has("moduleData") {
            Ok(EntryKind::Template)
        } else if has("assetData") || has("mediaKind") {
            Ok(EntryKind::Media)
        } else {
            Err(TypeError::UnrecognizedShape)
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media" => Ok(EntryKind::Media),
            "template" => Ok(EntryKind::Template),
            "sceneGraph" => Ok(EntryKind::SceneGraph),
            "location" => Ok(EntryKind::Location),
            "environment" => Ok(EntryKind::Environment),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentEntry
// ---------------------------------------------------------------------------

/// A content entry of any variant.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContentEntry {
    Media(MediaEntry),
    Template(TemplateDataEntry),
    SceneGraph(SceneGraphEntry),
    Location(LocationDataEntry),
    Environment(EnvironmentDataEntry),
}

impl ContentEntry {
    /// Decode an entry from a JSON value, using the `"kind"` tag when present
    /// and the structural shape otherwise.
    pub fn from_value(mut value: Value) -> Result<Self, TypeError> {
        let kind = match value.get("kind").and_then(Value::as_str) {
            Some(tag) => tag.parse::<EntryKind>()?,
            None => EntryKind::infer(&value)?,
        };
        if let Value::Object(map) = &mut value {
            map.remove("kind");
        }
        let ser = |e: serde_json::Error| TypeError::Serialization(e.to_string());
        let entry = match kind {
            EntryKind::Media => ContentEntry::Media(serde_json::from_value(value).map_err(ser)?),
            EntryKind::Template => {
                ContentEntry::Template(serde_json::from_value(value).map_err(ser)?)
            }
            EntryKind::SceneGraph => {
                ContentEntry::SceneGraph(serde_json::from_value(value).map_err(ser)?)
            }
            EntryKind::Location => {
                ContentEntry::Location(serde_json::from_value(value).map_err(ser)?)
            }
            EntryKind::Environment => {
                ContentEntry::Environment(serde_json::from_value(value).map_err(ser)?)
            }
        };
        Ok(entry)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, TypeError> {
        let value: Value =
            serde_json::from_slice(data).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            ContentEntry::Media(_) => EntryKind::Media,
            ContentEntry::Template(_) => EntryKind::Template,
            ContentEntry::SceneGraph(_) => EntryKind::SceneGraph,
            ContentEntry::Location(_) => EntryKind::Location,
            ContentEntry::Environment(_) => EntryKind::Environment,
        }
    }

    pub fn meta(&self) -> &ContentMeta {
        match self {
            ContentEntry::Media(e) => &e.meta,
            ContentEntry::Template(e) => &e.meta,
            ContentEntry::SceneGraph(e) => &e.meta,
            ContentEntry::Location(e) => &e.meta,
            ContentEntry::Environment(e) => &e.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ContentMeta {
        match self {
            ContentEntry::Media(e) => &mut e.meta,
            ContentEntry::Template(e) => &mut e.meta,
            ContentEntry::SceneGraph(e) => &mut e.meta,
            ContentEntry::Location(e) => &mut e.meta,
            ContentEntry::Environment(e) => &mut e.meta,
        }
    }

    pub fn guid(&self) -> &ContentGuid {
        &self.meta().guid
    }

    pub fn as_media(&self) -> Option<&MediaEntry> {
        match self {
            ContentEntry::Media(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_template(&self) -> Option<&TemplateDataEntry> {
        match self {
            ContentEntry::Template(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_scene_graph(&self) -> Option<&SceneGraphEntry> {
        match self {
            ContentEntry::SceneGraph(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&LocationDataEntry> {
        match self {
            ContentEntry::Location(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_environment(&self) -> Option<&EnvironmentDataEntry> {
        match self {
            ContentEntry::Environment(e) => Some(e),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ContentEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ContentEntry::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<MediaEntry> for ContentEntry {
    fn from(e: MediaEntry) -> Self {
        ContentEntry::Media(e)
    }
}

impl From<TemplateDataEntry> for ContentEntry {
    fn from(e: TemplateDataEntry) -> Self {
        ContentEntry::Template(e)
    }
}

impl From<SceneGraphEntry> for ContentEntry {
    fn from(e: SceneGraphEntry) -> Self {
        ContentEntry::SceneGraph(e)
    }
}

impl From<LocationDataEntry> for ContentEntry {
    fn from(e: LocationDataEntry) -> Self {
        ContentEntry::Location(e)
    }
}

impl From<EnvironmentDataEntry> for ContentEntry {
    fn from(e: EnvironmentDataEntry) -> Self {
        ContentEntry::Environment(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn media(guid: &str, kind: MediaKind, payload: &str) -> MediaEntry {
        MediaEntry::new(ContentGuid::new(guid), kind, payload)
    }

    #[test]
    fn serialized_entry_carries_kind_tag() {
        let entry = ContentEntry::from(media("m1", MediaKind::Model, "p1"));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["kind"], "media");
        assert_eq!(value["guid"], "m1");
        assert_eq!(value["assetData"]["downloadData"], "p1");
    }

    #[test]
    fn tagged_roundtrip_preserves_variant() {
        let env = EnvironmentDataEntry {
            meta: ContentMeta::new("env".into(), "Lobby"),
            scene_graph: "sg".into(),
            location: "loc".into(),
            network_data: None,
        };
        let entry = ContentEntry::from(env);
        let json = serde_json::to_vec(&entry).unwrap();
        let decoded = ContentEntry::from_json(&json).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn untagged_payloads_are_inferred() {
        let cases = [
            (json!({"guid": "a", "sceneItems": []}), EntryKind::SceneGraph),
            (json!({"guid": "b", "scenes": ["s"]}), EntryKind::Location),
            (
                json!({"guid": "c", "sceneGraph": "sg", "location": "l"}),
                EntryKind::Environment,
            ),
            (
                json!({"guid": "d", "sourceContentDataEntryGuid": "m"}),
                EntryKind::Template,
            ),
            (
                json!({"guid": "e", "mediaKind": "scene", "assetData": {"downloadData": "x"}}),
                EntryKind::Media,
            ),
        ];
        for (value, kind) in cases {
            let entry = ContentEntry::from_value(value).unwrap();
            assert_eq!(entry.kind(), kind);
        }
    }

    #[test]
    fn unknown_shape_is_rejected() {
        let err = ContentEntry::from_value(json!({"guid": "x"})).unwrap_err();
        assert_eq!(err, TypeError::UnrecognizedShape);
        let err = ContentEntry::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err, TypeError::UnrecognizedShape);
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        let err = ContentEntry::from_value(json!({"kind": "avatar"})).unwrap_err();
        assert_eq!(err, TypeError::UnknownKind("avatar".into()));
    }

    #[test]
    fn expected_hash_defaults_to_empty() {
        let mut data = AssetData::new("payload");
        assert_eq!(data.expected_hash(Platform::Ios), "");
        data.set_hash(Platform::Ios, "abc");
        assert_eq!(data.expected_hash(Platform::Ios), "abc");
        assert_eq!(
            data.missing_platforms(&[Platform::Ios, Platform::Android]),
            vec![Platform::Android]
        );
    }

    #[test]
    fn video_media_needs_no_local_bundle() {
        let video = media("v", MediaKind::Video, "stream");
        assert!(!video.requires_local_bundle());
        assert!(video.missing_hashes(&Platform::ALL).is_empty());

        let model = media("m", MediaKind::Model, "bundle");
        assert!(model.requires_local_bundle());
        assert_eq!(model.missing_hashes(&[Platform::Webgl]), vec![Platform::Webgl]);
    }

    #[test]
    fn configured_item_defaults_to_identity_rotation() {
        let item: ConfiguredItemEntry =
            serde_json::from_value(json!({"contentGuid": "t1"})).unwrap();
        assert_eq!(item.position, [0.0; 3]);
        assert_eq!(item.rotation, [0.0, 0.0, 0.0, 1.0]);
    }
}
