//! Archive metadata sidecar

use crate::descriptor::PluginDescriptor;
use crate::platform::Platform;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Platform value recorded for archives without a native backend
pub const UNIVERSAL_PLATFORM: &str = "universal";

/// Sidecar describing one distribution archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub license: String,
    /// Archive file name, without directory
    pub file: String,
    pub size: u64,
    pub checksum: String,
    pub algorithm: String,
    pub created_at: String,
    #[serde(default)]
    pub dependencies: Map<String, Value>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub platform: String,
}

impl ArchiveMetadata {
    /// Metadata for an archive built from `descriptor`. `platform` is the
    /// backend platform, `None` for frontend-only archives.
    pub fn new(
        descriptor: &PluginDescriptor,
        file: String,
        size: u64,
        checksum: String,
        platform: Option<&Platform>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            description: descriptor.description.clone().unwrap_or_default(),
            author: descriptor.author_string(),
            homepage: descriptor.homepage.clone().unwrap_or_default(),
            license: descriptor.license.clone().unwrap_or_default(),
            file,
            size,
            checksum,
            algorithm: super::archive::CHECKSUM_ALGORITHM.to_string(),
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            dependencies: descriptor.dependencies.clone(),
            permissions: descriptor.permissions.clone(),
            platform: platform
                .map(|p| p.token().to_string())
                .unwrap_or_else(|| UNIVERSAL_PLATFORM.to_string()),
        }
    }

    pub fn is_universal(&self) -> bool {
        self.platform == UNIVERSAL_PLATFORM
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&data).map_err(|e| {
            Error::Packaging(format!("invalid metadata {}: {}", path.display(), e))
        })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Archive file name: `<name>-<version>[-<platform>].zip`.
/// Scoped names keep only the part after the scope.
pub fn archive_file_name(name: &str, version: &str, platform: Option<&Platform>) -> String {
    let base = name.rsplit_once('/').map(|(_, rest)| rest).unwrap_or(name);
    match platform {
        Some(platform) => format!("{}-{}-{}.zip", base, version, platform.token()),
        None => format!("{}-{}.zip", base, version),
    }
}

/// Sidecar path for `archive`: same basename, `.json` extension
pub fn metadata_path_for(archive: &Path) -> PathBuf {
    archive.with_extension("json")
}
