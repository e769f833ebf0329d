//! Plugin packager
//!
//! Packs a compiled plugin directory into a zip archive plus a JSON
//! metadata sidecar carrying the archive's SHA-256 checksum.

pub mod archive;
pub mod metadata;

pub use archive::{ArchiveBuilder, CHECKSUM_ALGORITHM, sha256_file};
pub use metadata::{ArchiveMetadata, UNIVERSAL_PLATFORM, archive_file_name, metadata_path_for};

use crate::compiler::{BACKEND_DIR, COMPILED_ENTRY};
use crate::descriptor::{DESCRIPTOR_FILE, DescriptorFile, PluginDescriptor};
use crate::manifest::{MANIFEST_FILE, PluginManifest};
use crate::platform::{Platform, native_library_name};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Top-level files archived after the manifest, in this order
pub const ARCHIVED_FILES: &[&str] = &[
    DESCRIPTOR_FILE,
    COMPILED_ENTRY,
    "index.js.map",
    "README.md",
    "LICENSE",
];

/// Directories archived after the files, in this order
pub const ARCHIVED_DIRS: &[&str] = &["assets", BACKEND_DIR, "components", "styles", "locales"];

/// Prefix under which the authoring tree is stored when requested
pub const SOURCE_PREFIX: &str = "source";

/// Directory names never included in a source snapshot
const SOURCE_EXCLUDED_DIRS: &[&str] = &["node_modules", "target", "dist"];

/// Options for a package run
#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub release_dir: PathBuf,
    /// Append the authoring tree under `source/`
    pub include_source: bool,
    pub source_dir: Option<PathBuf>,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            release_dir: PathBuf::from("releases/plugins"),
            include_source: false,
            source_dir: None,
        }
    }
}

impl PackageOptions {
    pub fn with_release_dir(mut self, release_dir: impl Into<PathBuf>) -> Self {
        self.release_dir = release_dir.into();
        self
    }

    pub fn with_source(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.include_source = true;
        self.source_dir = Some(source_dir.into());
        self
    }
}

/// What a package run produced
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    pub archive_path: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: ArchiveMetadata,
}

/// Packages compiled plugin directories
pub struct Packager {
    options: PackageOptions,
    platform: Platform,
}

impl Packager {
    pub fn new(options: PackageOptions) -> Self {
        Self {
            options,
            platform: Platform::current(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Package the compiled plugin at `compiled_dir`
    pub async fn package(&self, compiled_dir: &Path) -> Result<PackageOutcome> {
        let source_dir = self
            .options
            .source_dir
            .as_deref()
            .filter(|_| self.options.include_source);
        self.package_with_source(compiled_dir, source_dir).await
    }

    /// Package `compiled_dir`, appending `source_dir` under `source/` when given
    pub async fn package_with_source(
        &self,
        compiled_dir: &Path,
        source_dir: Option<&Path>,
    ) -> Result<PackageOutcome> {
        for required in [DESCRIPTOR_FILE, COMPILED_ENTRY] {
            if !tokio::fs::try_exists(compiled_dir.join(required)).await? {
                return Err(Error::MissingFile(required.to_string()));
            }
        }

        let descriptor = DescriptorFile::load(compiled_dir).await?.descriptor;
        descriptor.validate()?;

        let library = native_library_name(&descriptor.name, &self.platform);
        let has_backend = tokio::fs::metadata(compiled_dir.join(BACKEND_DIR).join(&library))
            .await
            .is_ok_and(|m| m.is_file());
        let platform = has_backend.then_some(&self.platform);
        if has_backend {
            info!(library = %library, platform = %self.platform, "Native backend detected");
        }

        let file_name = archive_file_name(&descriptor.name, &descriptor.version, platform);
        tokio::fs::create_dir_all(&self.options.release_dir).await?;
        let archive_path = self.options.release_dir.join(&file_name);

        info!(plugin = %descriptor.name, archive = %archive_path.display(), "Packaging plugin");
        write_archive(
            compiled_dir.to_path_buf(),
            descriptor.clone(),
            source_dir.map(Path::to_path_buf),
            self.options.release_dir.clone(),
            archive_path.clone(),
        )
        .await?;

        let hashed = archive_path.clone();
        let checksum = tokio::task::spawn_blocking(move || sha256_file(&hashed))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        let size = tokio::fs::metadata(&archive_path).await?.len();

        let metadata = ArchiveMetadata::new(
            &descriptor,
            file_name,
            size,
            checksum,
            platform,
            chrono::Utc::now(),
        );
        let metadata_path = metadata_path_for(&archive_path);
        metadata.save(&metadata_path).await?;

        info!(
            archive = %archive_path.display(),
            size,
            checksum = %metadata.checksum,
            "Plugin packaged"
        );

        Ok(PackageOutcome {
            archive_path,
            metadata_path,
            metadata,
        })
    }
}

/// Build the archive into a temp file beside `archive_path` and move it
/// into place only once it is complete
async fn write_archive(
    compiled_dir: PathBuf,
    descriptor: PluginDescriptor,
    source_dir: Option<PathBuf>,
    release_dir: PathBuf,
    archive_path: PathBuf,
) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let temp = tempfile::Builder::new()
            .prefix(".plugsmith-")
            .suffix(".zip.partial")
            .tempfile_in(&release_dir)?;

        let mut builder = ArchiveBuilder::new(temp.reopen()?);
        let manifest = PluginManifest::derive(&descriptor);
        builder.add_bytes(MANIFEST_FILE, manifest.to_json()?.as_bytes())?;

        for file in ARCHIVED_FILES {
            let path = compiled_dir.join(file);
            if path.is_file() {
                builder.add_file(file, &path)?;
            }
        }

        for dir in ARCHIVED_DIRS {
            let path = compiled_dir.join(dir);
            if path.is_dir() {
                let added = builder.add_tree(dir, &path, |_, _| true)?;
                debug!(dir, files = added, "Archived directory");
            }
        }

        if let Some(source) = source_dir {
            let added = builder.add_tree(SOURCE_PREFIX, &source, keep_in_source_snapshot)?;
            debug!(files = added, "Archived source tree");
        }

        builder.finish()?;
        temp.persist(&archive_path)
            .map_err(|e| Error::Packaging(format!("could not move archive into place: {}", e)))?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

fn keep_in_source_snapshot(relative: &Path, is_dir: bool) -> bool {
    let Some(name) = relative.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') {
        return false;
    }
    !(is_dir && SOURCE_EXCLUDED_DIRS.contains(&name))
}
