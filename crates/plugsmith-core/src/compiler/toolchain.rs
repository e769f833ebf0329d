//! Native backend toolchain

use crate::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Manifest that marks a backend directory as a cargo crate
pub const BACKEND_MANIFEST: &str = "Cargo.toml";

/// Release output directory of a backend crate, relative to the crate root
pub fn release_dir(crate_dir: &Path) -> PathBuf {
    crate_dir.join("target").join("release")
}

/// Builds a plugin's native backend for the current platform
#[async_trait]
pub trait NativeToolchain: Send + Sync {
    /// Build `crate_dir` in release mode and return the directory holding
    /// the produced library
    async fn build_release(&self, crate_dir: &Path) -> Result<PathBuf>;
}

/// Toolchain that shells out to `cargo build --release`
#[derive(Debug, Clone)]
pub struct CargoToolchain {
    command: String,
}

impl Default for CargoToolchain {
    fn default() -> Self {
        Self::new("cargo")
    }
}

impl CargoToolchain {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl NativeToolchain for CargoToolchain {
    async fn build_release(&self, crate_dir: &Path) -> Result<PathBuf> {
        info!(dir = %crate_dir.display(), "Building native backend");

        // Pin the target dir so CARGO_TARGET_DIR in the environment cannot
        // move the library away from where the runtime looks for it.
        let output = Command::new(&self.command)
            .args(["build", "--release", "--target-dir", "target"])
            .current_dir(crate_dir)
            .output()
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::ToolNotFound(self.command.clone()),
                _ => Error::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            let message = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            return Err(Error::NativeBuild(if message.is_empty() {
                format!("{} exited with {}", self.command, output.status)
            } else {
                message
            }));
        }

        let out = release_dir(crate_dir);
        debug!(dir = %out.display(), "Native backend built");
        Ok(out)
    }
}
