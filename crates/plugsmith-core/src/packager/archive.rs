//! Deterministic zip writing and archive checksums

use crate::fsutil::{self, WalkEntry};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Checksum algorithm recorded in archive metadata
pub const CHECKSUM_ALGORITHM: &str = "sha256";

/// Zip writer that stamps every entry with the same timestamp and mode, so
/// the same inputs always produce the same bytes
pub struct ArchiveBuilder<W: Write + Seek> {
    zip: ZipWriter<W>,
    entries: Vec<String>,
}

impl<W: Write + Seek> ArchiveBuilder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            entries: Vec::new(),
        }
    }

    fn options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644)
    }

    /// Add an in-memory entry
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.zip.start_file(name, Self::options())?;
        self.zip.write_all(data)?;
        self.entries.push(name.to_string());
        Ok(())
    }

    /// Add the file at `path` under `name`
    pub fn add_file(&mut self, name: &str, path: &Path) -> Result<()> {
        self.zip.start_file(name, Self::options())?;
        let mut file = File::open(path)?;
        io::copy(&mut file, &mut self.zip)?;
        self.entries.push(name.to_string());
        Ok(())
    }

    /// Add every file under `dir` below `prefix/`, in sorted walk order.
    /// Returns the number of files added.
    pub fn add_tree<F>(&mut self, prefix: &str, dir: &Path, keep: F) -> Result<usize>
    where
        F: Fn(&Path, bool) -> bool,
    {
        let mut added = 0;
        for WalkEntry {
            relative,
            absolute,
            is_dir,
        } in fsutil::walk_sorted(dir, keep)?
        {
            if is_dir {
                continue;
            }
            let name = format!("{}/{}", prefix, fsutil::archive_path(&relative));
            self.add_file(&name, &absolute)?;
            added += 1;
        }
        Ok(added)
    }

    /// Entry names written so far, in order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Write the central directory and hand back the writer
    pub fn finish(mut self) -> Result<W> {
        Ok(self.zip.finish()?)
    }
}

/// Hex-encoded SHA-256 of everything `reader` yields
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded SHA-256 of the file at `path`, streamed
pub fn sha256_file(path: &Path) -> io::Result<String> {
    sha256_reader(File::open(path)?)
}

/// Read one entry of the archive at `archive`, or `None` if it is absent
pub fn read_entry(archive: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(Error::Archive(e)),
    };
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(Some(data))
}

/// Entry names of the archive at `archive`, in central-directory order
pub fn entry_names(archive: &Path) -> Result<Vec<String>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut names = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        names.push(zip.by_index(i)?.name().to_string());
    }
    Ok(names)
}
