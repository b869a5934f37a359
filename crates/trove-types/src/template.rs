//! Composable templates.
//!
//! A template wraps a base media entry with an ordered list of typed module
//! records. Each module may declare extra content it depends on; the
//! template's dependency list is the flattening of the base asset and every
//! module dependency.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::ContentMeta;
use crate::guid::ContentGuid;

/// A typed module configuration record attached to a template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "moduleType", rename_all = "camelCase")]
pub enum ModuleData {
    Material {
        #[serde(default)]
        textures: Vec<ContentGuid>,
        #[serde(default)]
        shader: Option<String>,
    },
    Audio {
        #[serde(default)]
        clips: Vec<ContentGuid>,
        #[serde(default)]
        spatial: bool,
    },
    Animation {
        #[serde(default)]
        clips: Vec<ContentGuid>,
        #[serde(default)]
        looping: bool,
    },
    Behaviour {
        #[serde(default)]
        script: Option<ContentGuid>,
        #[serde(default)]
        parameters: Value,
    },
    Generic {
        #[serde(default)]
        dependencies: Vec<ContentGuid>,
        #[serde(default)]
        config: Value,
    },
}

impl ModuleData {
    /// Content GUIDs this module needs at runtime, in declaration order.
    pub fn dependencies(&self) -> Vec<&ContentGuid> {
        match self {
            ModuleData::Material { textures, .. } => textures.iter().collect(),
            ModuleData::Audio { clips, .. } | ModuleData::Animation { clips, .. } => {
                clips.iter().collect()
            }
            ModuleData::Behaviour { script, .. } => script.iter().collect(),
            ModuleData::Generic { dependencies, .. } => dependencies.iter().collect(),
        }
    }

    pub fn generic(dependencies: Vec<ContentGuid>) -> Self {
        ModuleData::Generic {
            dependencies,
            config: Value::Null,
        }
    }
}

/// Template entry with a derived, cached dependency list.
///
/// `dependency_list` is never read from the wire. It is rebuilt whenever the
/// source or the modules change and always holds the source GUID and every
/// module dependency exactly once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "TemplateRecord")]
pub struct TemplateDataEntry {
    #[serde(flatten)]
    pub meta: ContentMeta,
    source_content_data_entry_guid: ContentGuid,
    module_data: Vec<ModuleData>,
    dependency_list: Vec<ContentGuid>,
}

/// Wire shape of a template; the dependency list is recomputed on decode.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateRecord {
    #[serde(flatten)]
    meta: ContentMeta,
    #[serde(default)]
    source_content_data_entry_guid: ContentGuid,
    #[serde(default)]
    module_data: Vec<ModuleData>,
}

impl From<TemplateRecord> for TemplateDataEntry {
    fn from(record: TemplateRecord) -> Self {
        TemplateDataEntry::new(
            record.meta,
            record.source_content_data_entry_guid,
            record.module_data,
        )
    }
}

impl TemplateDataEntry {
    pub fn new(meta: ContentMeta, source: ContentGuid, modules: Vec<ModuleData>) -> Self {
        let mut entry = Self {
            meta,
            source_content_data_entry_guid: source,
            module_data: modules,
            dependency_list: Vec::new(),
        };
        entry.refresh_dependencies();
        entry
    }

    /// The media entry acting as the base asset.
    pub fn source(&self) -> &ContentGuid {
        &self.source_content_data_entry_guid
    }

    pub fn modules(&self) -> &[ModuleData] {
        &self.module_data
    }

    pub fn dependency_list(&self) -> &[ContentGuid] {
        &self.dependency_list
    }

    pub fn set_source(&mut self, source: ContentGuid) {
        self.source_content_data_entry_guid = source;
        self.refresh_dependencies();
    }

    pub fn set_modules(&mut self, modules: Vec<ModuleData>) {
        self.module_data = modules;
        self.refresh_dependencies();
    }

    pub fn push_module(&mut self, module: ModuleData) {
        self.module_data.push(module);
        self.refresh_dependencies();
    }

    pub fn remove_module(&mut self, index: usize) -> Option<ModuleData> {
        if index >= self.module_data.len() {
            return None;
        }
        let removed = self.module_data.remove(index);
        self.refresh_dependencies();
        Some(removed)
    }

    fn refresh_dependencies(&mut self) {
        let mut seen = HashSet::new();
        let mut list = Vec::new();
        let module_deps = self.module_data.iter().flat_map(ModuleData::dependencies);
        for guid in std::iter::once(&self.source_content_data_entry_guid).chain(module_deps) {
            if guid.is_empty() {
                continue;
            }
            if seen.insert(guid.clone()) {
                list.push(guid.clone());
            }
        }
        self.dependency_list = list;
    }
}
