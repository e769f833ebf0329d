//! Load-time manifest derived from the plugin descriptor
//!
//! The manifest is regenerated on every compile and every package run and
//! is never edited by hand. Derivation is a pure function of the
//! descriptor: identical input always yields identical bytes.

use crate::descriptor::{BackendSpec, PluginDescriptor};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File name of the derived manifest
pub const MANIFEST_FILE: &str = "manifest.json";

/// Entry used when the descriptor does not declare `main`
pub const DEFAULT_ENTRY: &str = "index.js";

/// Authoring-language extensions and their compiled counterparts
const ENTRY_EXTENSIONS: &[(&str, &str)] = &[
    (".tsx", ".js"),
    (".mts", ".mjs"),
    (".cts", ".cjs"),
    (".ts", ".js"),
];

/// Manifest consumed by the host application when it loads a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub homepage: String,
    pub entry: String,
    pub icon: String,
    pub permissions: Vec<String>,
    pub dependencies: Map<String, Value>,
    pub backend: BackendSpec,
    pub config: Map<String, Value>,
}

impl PluginManifest {
    /// Derive the manifest from a descriptor
    pub fn derive(descriptor: &PluginDescriptor) -> Self {
        Self {
            id: descriptor.name.clone(),
            name: descriptor
                .display_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| descriptor.name.clone()),
            version: descriptor.version.clone(),
            description: descriptor.description.clone().unwrap_or_default(),
            author: descriptor.author_string(),
            homepage: descriptor.homepage.clone().unwrap_or_default(),
            entry: descriptor
                .main
                .as_deref()
                .map(normalize_entry)
                .unwrap_or_else(|| DEFAULT_ENTRY.to_string()),
            icon: descriptor.icon.clone().unwrap_or_default(),
            permissions: descriptor.permissions.clone(),
            dependencies: descriptor.plugin_dependencies.clone(),
            backend: descriptor.backend.clone().unwrap_or_default(),
            config: descriptor.config.clone(),
        }
    }

    /// Same manifest pointing at `entry`, for output where the bundle
    /// location is fixed by the compiler
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Serialized form written to disk and into archives
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Rewrite an authoring-language entry path to the compiled extension
pub fn normalize_entry(entry: &str) -> String {
    for (source, compiled) in ENTRY_EXTENSIONS {
        if let Some(stem) = entry.strip_suffix(source) {
            return format!("{}{}", stem, compiled);
        }
    }
    entry.to_string()
}

/// True for TypeScript sources that must not ship in compiled output.
/// Type declaration files (`.d.ts` and friends) are not sources.
pub fn is_authoring_source(file_name: &str) -> bool {
    let is_declaration = [".d.ts", ".d.mts", ".d.cts"]
        .iter()
        .any(|ext| file_name.ends_with(ext));
    if is_declaration {
        return false;
    }
    ENTRY_EXTENSIONS
        .iter()
        .any(|(source, _)| file_name.ends_with(source))
}
