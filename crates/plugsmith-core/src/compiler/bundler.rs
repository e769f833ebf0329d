//! Frontend bundling

use crate::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Packages the host application provides at runtime. Bundles import them
/// as bare specifiers instead of inlining a second copy.
pub const HOST_EXTERNALS: &[&str] = &[
    "vue",
    "vue-router",
    "pinia",
    "@tauri-apps/api",
    "@tauri-apps/api/*",
];

/// True when `specifier` is satisfied by the host at runtime
pub fn is_host_external(specifier: &str) -> bool {
    HOST_EXTERNALS.iter().any(|external| match external.strip_suffix("/*") {
        Some(prefix) => specifier
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/')),
        None => specifier == *external,
    })
}

/// What to bundle and where to put it
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub entry: PathBuf,
    pub outfile: PathBuf,
    /// Directory the bundler resolves `node_modules` from
    pub working_dir: PathBuf,
    pub minify: bool,
    pub sourcemap: bool,
    pub externals: Vec<String>,
}

impl BundleRequest {
    pub fn new(entry: PathBuf, outfile: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            entry,
            outfile,
            working_dir,
            minify: true,
            sourcemap: true,
            externals: HOST_EXTERNALS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    pub fn with_sourcemap(mut self, sourcemap: bool) -> Self {
        self.sourcemap = sourcemap;
        self
    }
}

/// Turns a plugin entry point into a single ES module
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(&self, request: &BundleRequest) -> Result<()>;
}

/// Bundler backed by the `esbuild` executable
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    command: String,
}

impl Default for EsbuildBundler {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

impl EsbuildBundler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Command-line arguments for `request`
    pub fn args(&self, request: &BundleRequest) -> Vec<String> {
        let mut args = vec![
            request.entry.display().to_string(),
            "--bundle".to_string(),
            "--format=esm".to_string(),
            "--platform=browser".to_string(),
            "--target=es2020".to_string(),
            format!("--outfile={}", request.outfile.display()),
        ];
        if request.minify {
            args.push("--minify".to_string());
        }
        if request.sourcemap {
            args.push("--sourcemap".to_string());
        }
        for external in &request.externals {
            args.push(format!("--external:{}", external));
        }
        args
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    async fn bundle(&self, request: &BundleRequest) -> Result<()> {
        let args = self.args(request);
        debug!(command = %self.command, ?args, "Running bundler");

        let output = Command::new(&self.command)
            .args(&args)
            .current_dir(&request.working_dir)
            .output()
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::ToolNotFound(self.command.clone()),
                _ => Error::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::Bundle {
                entry: request.entry.clone(),
                message: if stderr.is_empty() {
                    format!("{} exited with {}", self.command, output.status)
                } else {
                    stderr
                },
            });
        }
        Ok(())
    }
}
