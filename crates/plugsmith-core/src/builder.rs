//! Batch driver: compile (and optionally package) many plugins in one run

use crate::compiler::Compiler;
use crate::packager::{PackageOutcome, Packager};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Directory prefixes of sample plugins skipped unless asked for
pub const EXAMPLE_PREFIXES: &[&str] = &["example-", "demo-"];

/// Which plugins a build run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSelection {
    /// Every plugin directory under the plugins root
    All,
    /// Only these directory names
    Named(Vec<String>),
}

/// Options for a build run
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub plugins_dir: PathBuf,
    pub include_examples: bool,
    /// Package each plugin after compiling it
    pub package: bool,
    /// Add the source tree to packaged archives
    pub include_source: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from("plugins"),
            include_examples: false,
            package: false,
            include_source: false,
        }
    }
}

/// Outcome for one successfully built plugin
#[derive(Debug, Clone)]
pub struct BuiltPlugin {
    pub name: String,
    pub output_dir: PathBuf,
    pub package: Option<PackageOutcome>,
}

/// Aggregated result of a build run
#[derive(Debug, Default)]
pub struct BuildReport {
    pub succeeded: Vec<BuiltPlugin>,
    pub failed: Vec<(String, Error)>,
}

impl BuildReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the compiler and packager over a set of plugin directories,
/// one plugin at a time
pub struct BuildDriver {
    options: BuildOptions,
    compiler: Compiler,
    packager: Packager,
}

impl BuildDriver {
    pub fn new(options: BuildOptions, compiler: Compiler, packager: Packager) -> Self {
        Self {
            options,
            compiler,
            packager,
        }
    }

    /// Plugin directory names under the plugins root, sorted
    pub async fn discover(&self) -> Result<Vec<String>> {
        discover_plugins(&self.options.plugins_dir, self.options.include_examples).await
    }

    /// Build the selected plugins. Failures are collected in the report
    /// and do not stop the run.
    pub async fn build(&self, selection: &BuildSelection) -> Result<BuildReport> {
        let names = match selection {
            BuildSelection::All => self.discover().await?,
            BuildSelection::Named(names) => names.clone(),
        };

        info!(count = names.len(), "Building plugins");
        let mut report = BuildReport::default();
        for (index, name) in names.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, names.len(), name);
            match self.build_one(name).await {
                Ok(built) => report.succeeded.push(built),
                Err(e) => {
                    error!(plugin = %name, error = %e, "Build failed");
                    report.failed.push((name.clone(), e));
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Build finished"
        );
        Ok(report)
    }

    async fn build_one(&self, name: &str) -> Result<BuiltPlugin> {
        let source_dir = self.options.plugins_dir.join(name);
        if !tokio::fs::metadata(&source_dir)
            .await
            .is_ok_and(|m| m.is_dir())
        {
            return Err(Error::PluginNotFound(name.to_string()));
        }

        let compiled = self.compiler.compile(&source_dir).await?;

        let package = if self.options.package {
            let source = self
                .options
                .include_source
                .then_some(source_dir.as_path());
            Some(
                self.packager
                    .package_with_source(&compiled.output_dir, source)
                    .await?,
            )
        } else {
            None
        };

        Ok(BuiltPlugin {
            name: name.to_string(),
            output_dir: compiled.output_dir,
            package,
        })
    }
}

/// Directory names under `plugins_dir`, sorted, without example plugins
/// unless `include_examples` is set
pub async fn discover_plugins(plugins_dir: &Path, include_examples: bool) -> Result<Vec<String>> {
    if !tokio::fs::metadata(plugins_dir)
        .await
        .is_ok_and(|m| m.is_dir())
    {
        return Err(Error::MissingFile(plugins_dir.display().to_string()));
    }

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(plugins_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if !include_examples && is_example(&name) {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

pub fn is_example(name: &str) -> bool {
    EXAMPLE_PREFIXES.iter().any(|p| name.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{BundleRequest, Bundler, CompileOptions};
    use crate::packager::PackageOptions;
    use crate::platform::Platform;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct StubBundler;

    #[async_trait]
    impl Bundler for StubBundler {
        async fn bundle(&self, request: &BundleRequest) -> Result<()> {
            std::fs::write(&request.outfile, "export default {}")?;
            Ok(())
        }
    }

    fn plugin(root: &Path, name: &str, descriptor: &str) {
        let dir = root.join("plugins").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("package.json"), descriptor).unwrap();
        std::fs::write(dir.join("index.ts"), "export default {}").unwrap();
    }

    fn good(root: &Path, name: &str) {
        plugin(
            root,
            name,
            &format!(r#"{{"name": "{}", "version": "1.0.0"}}"#, name),
        );
    }

    fn driver(root: &Path, options: BuildOptions) -> BuildDriver {
        let compiler = Compiler::new(CompileOptions::default().with_out_root(root.join("dist")))
            .with_bundler(Arc::new(StubBundler))
            .with_platform(Platform::Linux);
        let packager = Packager::new(PackageOptions::default().with_release_dir(root.join("releases")))
            .with_platform(Platform::Linux);
        BuildDriver::new(
            BuildOptions {
                plugins_dir: root.join("plugins"),
                ..options
            },
            compiler,
            packager,
        )
    }

    #[tokio::test]
    async fn test_discover_skips_examples_and_sorts() {
        let tmp = TempDir::new().unwrap();
        good(tmp.path(), "zeta");
        good(tmp.path(), "alpha");
        good(tmp.path(), "example-llm-tools");
        good(tmp.path(), "demo-no-slot");
        std::fs::write(tmp.path().join("plugins/notes.txt"), "").unwrap();

        let names = discover_plugins(&tmp.path().join("plugins"), false).await.unwrap();
        assert_eq!(names, vec!["alpha", "zeta"]);

        let all = discover_plugins(&tmp.path().join("plugins"), true).await.unwrap();
        assert_eq!(all, vec!["alpha", "demo-no-slot", "example-llm-tools", "zeta"]);
    }

    #[tokio::test]
    async fn test_discover_missing_root() {
        let tmp = TempDir::new().unwrap();
        let err = discover_plugins(&tmp.path().join("plugins"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingFile(_)));
    }

    #[tokio::test]
    async fn test_build_continues_after_failure() {
        let tmp = TempDir::new().unwrap();
        good(tmp.path(), "alpha");
        plugin(tmp.path(), "broken", r#"{"name": "broken"}"#);
        good(tmp.path(), "zeta");

        let report = driver(tmp.path(), BuildOptions::default())
            .build(&BuildSelection::All)
            .await
            .unwrap();

        assert_eq!(report.total(), 3);
        assert!(!report.is_success());
        let succeeded: Vec<_> = report.succeeded.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(succeeded, vec!["alpha", "zeta"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert!(report.failed[0].1.is_validation());
    }

    #[tokio::test]
    async fn test_build_named_and_package() {
        let tmp = TempDir::new().unwrap();
        good(tmp.path(), "alpha");
        good(tmp.path(), "zeta");

        let options = BuildOptions {
            package: true,
            ..BuildOptions::default()
        };
        let report = driver(tmp.path(), options)
            .build(&BuildSelection::Named(vec!["zeta".into()]))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 1);
        let package = report.succeeded[0].package.as_ref().unwrap();
        assert_eq!(
            package.archive_path,
            tmp.path().join("releases/zeta-1.0.0.zip")
        );
        assert!(!tmp.path().join("dist/alpha").exists());
    }

    #[tokio::test]
    async fn test_unknown_named_plugin_fails() {
        let tmp = TempDir::new().unwrap();
        good(tmp.path(), "alpha");

        let report = driver(tmp.path(), BuildOptions::default())
            .build(&BuildSelection::Named(vec!["ghost".into()]))
            .await
            .unwrap();

        assert!(!report.is_success());
        assert!(matches!(report.failed[0].1, Error::PluginNotFound(_)));
    }
}
