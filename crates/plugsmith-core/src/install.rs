//! Archive verification, installation and discovery of installed plugins

use crate::manifest::{MANIFEST_FILE, PluginManifest};
use crate::packager::archive::{read_entry, sha256_file};
use crate::packager::metadata::{ArchiveMetadata, metadata_path_for};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// A plugin unpacked under a plugins directory
#[derive(Debug, Clone)]
pub struct InstalledPlugin {
    pub dir: PathBuf,
    pub manifest: PluginManifest,
}

/// Directory name for a plugin id: `@` dropped, `/` replaced by `-`
pub fn install_dir_name(id: &str) -> String {
    id.replace('@', "").replace('/', "-")
}

/// Install directory name for `id`, refusing names that would resolve
/// outside a single child of the plugins directory
fn checked_dir_name(id: &str) -> Result<String> {
    let name = install_dir_name(id);
    let escapes = matches!(name.as_str(), "" | "." | "..")
        || name.contains(['\\', '\0'])
        || Path::new(&name).components().count() != 1;
    if escapes {
        return Err(Error::InvalidInput(format!(
            "plugin id '{id}' does not map to a usable install directory"
        )));
    }
    Ok(name)
}

/// Recompute the archive checksum and compare it with the sidecar.
///
/// When `metadata` is `None` the sidecar is looked up next to the archive.
pub async fn verify_archive(archive: &Path, metadata: Option<&Path>) -> Result<ArchiveMetadata> {
    if !tokio::fs::try_exists(archive).await? {
        return Err(Error::MissingFile(archive.display().to_string()));
    }

    let metadata_path = metadata
        .map(Path::to_path_buf)
        .unwrap_or_else(|| metadata_path_for(archive));
    if !tokio::fs::try_exists(&metadata_path).await? {
        return Err(Error::MissingFile(metadata_path.display().to_string()));
    }
    let meta = ArchiveMetadata::load(&metadata_path).await?;

    if meta.algorithm != crate::packager::CHECKSUM_ALGORITHM {
        return Err(Error::Packaging(format!(
            "unsupported checksum algorithm '{}'",
            meta.algorithm
        )));
    }

    let hashed = archive.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || sha256_file(&hashed))
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))??;

    if !actual.eq_ignore_ascii_case(&meta.checksum) {
        return Err(Error::ChecksumMismatch {
            file: meta.file.clone(),
            expected: meta.checksum.clone(),
            actual,
        });
    }

    debug!(archive = %archive.display(), "Checksum verified");
    Ok(meta)
}

/// Unpack `archive` into `<plugins_dir>/<id>`.
///
/// The archive is verified first when a sidecar sits next to it. An
/// existing install is only replaced when `force` is set.
pub async fn install_archive(
    archive: &Path,
    plugins_dir: &Path,
    force: bool,
) -> Result<InstalledPlugin> {
    if !tokio::fs::try_exists(archive).await? {
        return Err(Error::MissingFile(archive.display().to_string()));
    }
    if tokio::fs::try_exists(metadata_path_for(archive)).await? {
        verify_archive(archive, None).await?;
    } else {
        warn!(archive = %archive.display(), "No metadata sidecar found, installing unverified");
    }

    let archive_owned = archive.to_path_buf();
    let manifest_bytes = tokio::task::spawn_blocking(move || read_entry(&archive_owned, MANIFEST_FILE))
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))??
        .ok_or_else(|| Error::MissingFile(MANIFEST_FILE.to_string()))?;
    let manifest: PluginManifest = serde_json::from_slice(&manifest_bytes)?;
    if manifest.id.trim().is_empty() {
        return Err(Error::MissingField("id"));
    }

    let dir_name = checked_dir_name(&manifest.id)?;
    let target = plugins_dir.join(&dir_name);
    let replacing = tokio::fs::try_exists(&target).await?;
    if replacing {
        if !force {
            return Err(Error::AlreadyInstalled(manifest.id.clone()));
        }
        info!(plugin = %manifest.id, "Replacing existing install");
    }
    tokio::fs::create_dir_all(plugins_dir).await?;

    let archive_owned = archive.to_path_buf();
    let plugins_owned = plugins_dir.to_path_buf();
    let target_owned = target.clone();
    let extracted = tokio::task::spawn_blocking(move || {
        extract_into(&archive_owned, &plugins_owned, &target_owned, replacing)
    })
    .await
    .map_err(|e| Error::Io(io::Error::other(e)))??;

    info!(plugin = %manifest.id, version = %manifest.version, files = extracted, dir = %target.display(), "Plugin installed");
    Ok(InstalledPlugin {
        dir: target,
        manifest,
    })
}

/// Extract into a staging directory beside `target`, then swap it in.
///
/// A previous install is moved aside only after extraction succeeded and is
/// restored if the final rename fails.
fn extract_into(archive: &Path, plugins_dir: &Path, target: &Path, replacing: bool) -> Result<usize> {
    let staging = tempfile::Builder::new()
        .prefix(".plugsmith-install-")
        .tempdir_in(plugins_dir)?;

    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "Skipping entry with unsafe path");
            continue;
        };
        let out = staging.path().join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
        extracted += 1;
    }

    if !replacing {
        fs::rename(staging.path(), target)?;
        return Ok(extracted);
    }

    // dropped at the end of scope, taking the previous install with it
    let retired = tempfile::Builder::new()
        .prefix(".plugsmith-replaced-")
        .tempdir_in(plugins_dir)?;
    let previous = retired.path().join("previous");
    fs::rename(target, &previous)?;
    if let Err(e) = fs::rename(staging.path(), target) {
        warn!(dir = %target.display(), error = %e, "Restoring previous install");
        fs::rename(&previous, target)?;
        return Err(e.into());
    }
    debug!(dir = %target.display(), "Previous install replaced");
    Ok(extracted)
}

/// Every plugin under `plugins_dir` that has a readable manifest, sorted
/// by directory name
pub async fn list_installed(plugins_dir: &Path) -> Result<Vec<InstalledPlugin>> {
    if !tokio::fs::try_exists(plugins_dir).await? {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    let mut entries = tokio::fs::read_dir(plugins_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    let mut plugins = Vec::new();
    for dir in dirs {
        let manifest_path = dir.join(MANIFEST_FILE);
        let data = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<PluginManifest>(&data) {
            Ok(manifest) => plugins.push(InstalledPlugin { dir, manifest }),
            Err(e) => warn!(path = %manifest_path.display(), error = %e, "Ignoring unreadable manifest"),
        }
    }
    Ok(plugins)
}
