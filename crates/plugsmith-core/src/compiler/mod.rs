//! Plugin compiler
//!
//! Turns a plugin source directory into a compiled artifact set:
//!
//! ```text
//! <out>/index.js            bundled entry
//! <out>/index.js.map        when sourcemaps are on
//! <out>/backend/<lib>       when the plugin ships a native backend
//! <out>/assets ...          copied verbatim, authoring sources dropped
//! <out>/manifest.json       derived load-time manifest
//! <out>/package.json        trimmed descriptor
//! ```
//!
//! Each step short-circuits the rest on failure.

pub mod bundler;
pub mod toolchain;

pub use bundler::{BundleRequest, Bundler, EsbuildBundler, HOST_EXTERNALS, is_host_external};
pub use toolchain::{BACKEND_MANIFEST, CargoToolchain, NativeToolchain};

use crate::descriptor::{DESCRIPTOR_FILE, DescriptorFile};
use crate::manifest::{MANIFEST_FILE, PluginManifest, is_authoring_source};
use crate::platform::{Platform, native_library_name};
use crate::{Error, Result, fsutil};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point candidates, in priority order
pub const ENTRY_CANDIDATES: &[&str] = &["index.ts", "index.js", "src/index.ts", "src/index.js"];

/// Compiled entry file name
pub const COMPILED_ENTRY: &str = "index.js";

/// Top-level files copied into the compiled output when present
pub const COPIED_FILES: &[&str] = &["README.md", "LICENSE"];

/// Top-level directories copied into the compiled output when present
pub const COPIED_DIRS: &[&str] = &["assets", "components", "styles", "locales"];

/// Sub-directory holding the native backend, in both source and output
pub const BACKEND_DIR: &str = "backend";

/// Options for a compile run
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Root under which `<plugin dir name>/` is created
    pub out_root: PathBuf,
    /// Exact output directory, overriding `out_root`
    pub output_dir: Option<PathBuf>,
    pub minify: bool,
    pub sourcemap: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            out_root: PathBuf::from("dist/plugins"),
            output_dir: None,
            minify: true,
            sourcemap: true,
        }
    }
}

impl CompileOptions {
    pub fn with_out_root(mut self, out_root: impl Into<PathBuf>) -> Self {
        self.out_root = out_root.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    pub fn with_sourcemap(mut self, sourcemap: bool) -> Self {
        self.sourcemap = sourcemap;
        self
    }

    /// Output directory for the plugin sourced at `source_dir`
    pub fn output_for(&self, source_dir: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => {
                let name = source_dir
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| "plugin".into());
                self.out_root.join(name)
            }
        }
    }
}

/// Result of a successful compile
#[derive(Debug, Clone)]
pub struct CompiledPlugin {
    pub name: String,
    pub version: String,
    pub output_dir: PathBuf,
    /// Source-relative entry that was bundled
    pub entry: PathBuf,
    /// Path of the copied native library, if any
    pub backend_library: Option<PathBuf>,
    pub manifest: PluginManifest,
}

/// Compiles plugin source trees
pub struct Compiler {
    options: CompileOptions,
    bundler: Arc<dyn Bundler>,
    toolchain: Arc<dyn NativeToolchain>,
    platform: Platform,
}

impl Compiler {
    /// Compiler using `esbuild` and `cargo` from PATH
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            bundler: Arc::new(EsbuildBundler::default()),
            toolchain: Arc::new(CargoToolchain::default()),
            platform: Platform::current(),
        }
    }

    pub fn with_bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = bundler;
        self
    }

    pub fn with_toolchain(mut self, toolchain: Arc<dyn NativeToolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile the plugin at `source_dir`
    pub async fn compile(&self, source_dir: &Path) -> Result<CompiledPlugin> {
        let descriptor_file = DescriptorFile::load(source_dir).await?;
        let descriptor = &descriptor_file.descriptor;
        descriptor.validate()?;

        info!(plugin = %descriptor.name, version = %descriptor.version, "Compiling plugin");

        let out_dir = self.options.output_for(source_dir);
        reset_dir(&out_dir).await?;

        let entry = locate_entry(source_dir)
            .await?
            .ok_or_else(|| Error::NoEntryPoint(source_dir.to_path_buf()))?;
        debug!(entry = %entry.display(), "Found entry point");

        let request = BundleRequest::new(
            source_dir.join(&entry),
            out_dir.join(COMPILED_ENTRY),
            source_dir.to_path_buf(),
        )
        .with_minify(self.options.minify)
        .with_sourcemap(self.options.sourcemap);
        self.bundler.bundle(&request).await?;

        let backend_library = self
            .build_backend(&descriptor.name, source_dir, &out_dir)
            .await?;

        copy_assets(source_dir, &out_dir).await?;

        // the bundle always lands at the output root, whatever `main` declared
        let manifest = PluginManifest::derive(descriptor).with_entry(COMPILED_ENTRY);
        tokio::fs::write(out_dir.join(MANIFEST_FILE), manifest.to_json()?).await?;

        let mut trimmed = descriptor_file.trimmed();
        trimmed.insert(
            "main".to_string(),
            serde_json::Value::String(COMPILED_ENTRY.to_string()),
        );
        let mut trimmed = serde_json::to_string_pretty(&trimmed)?;
        trimmed.push('\n');
        tokio::fs::write(out_dir.join(DESCRIPTOR_FILE), trimmed).await?;

        info!(plugin = %descriptor.name, out = %out_dir.display(), "Plugin compiled");

        Ok(CompiledPlugin {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            output_dir: out_dir,
            entry,
            backend_library,
            manifest,
        })
    }

    async fn build_backend(
        &self,
        name: &str,
        source_dir: &Path,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let crate_dir = source_dir.join(BACKEND_DIR);
        if !tokio::fs::try_exists(crate_dir.join(BACKEND_MANIFEST)).await? {
            return Ok(None);
        }

        let release_dir = self.toolchain.build_release(&crate_dir).await?;
        let library = native_library_name(name, &self.platform);
        let built = release_dir.join(&library);
        if !tokio::fs::try_exists(&built).await? {
            return Err(Error::NativeBuild(format!(
                "expected library {} was not produced",
                built.display()
            )));
        }

        let target_dir = out_dir.join(BACKEND_DIR);
        tokio::fs::create_dir_all(&target_dir).await?;
        let target = target_dir.join(&library);
        tokio::fs::copy(&built, &target).await?;
        info!(library = %library, "Copied native backend");
        Ok(Some(target))
    }
}

/// First entry candidate present in `source_dir`
pub async fn locate_entry(source_dir: &Path) -> Result<Option<PathBuf>> {
    for candidate in ENTRY_CANDIDATES {
        if tokio::fs::try_exists(source_dir.join(candidate)).await? {
            return Ok(Some(PathBuf::from(candidate)));
        }
    }
    Ok(None)
}

async fn reset_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await? {
        debug!(dir = %dir.display(), "Clearing previous output");
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

async fn copy_assets(source_dir: &Path, out_dir: &Path) -> Result<()> {
    for file in COPIED_FILES {
        let src = source_dir.join(file);
        if tokio::fs::try_exists(&src).await? {
            tokio::fs::copy(&src, out_dir.join(file)).await?;
            debug!(file, "Copied file");
        }
    }

    for dir in COPIED_DIRS {
        let src = source_dir.join(dir);
        if !tokio::fs::metadata(&src).await.is_ok_and(|m| m.is_dir()) {
            continue;
        }
        let dst = out_dir.join(dir);
        let copied = tokio::task::spawn_blocking(move || {
            fsutil::copy_dir_filtered(&src, &dst, is_authoring_source)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        if copied == 0 {
            warn!(dir, "Asset directory contained no shippable files");
        } else {
            debug!(dir, files = copied, "Copied directory");
        }
    }
    Ok(())
}
