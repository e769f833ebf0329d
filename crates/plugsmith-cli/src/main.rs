//! Plugsmith CLI - build, package and install host plugins

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use plugsmith_core::builder::{BuildDriver, BuildOptions, BuildReport, BuildSelection};
use plugsmith_core::compiler::{
    COMPILED_ENTRY, CargoToolchain, CompileOptions, Compiler, EsbuildBundler,
};
use plugsmith_core::config::Config;
use plugsmith_core::descriptor::DescriptorFile;
use plugsmith_core::install::{install_archive, list_installed, verify_archive};
use plugsmith_core::manifest::PluginManifest;
use plugsmith_core::packager::{PackageOptions, PackageOutcome, Packager};
use plugsmith_core::platform::Platform;
use plugsmith_core::scaffold::{ScaffoldOptions, create_plugin};
use plugsmith_core::validate::validate_compiled;
use plugsmith_core::watch::{DevWatcher, WatchCompile};
use plugsmith_runtime::{NativeBridge, PluginHost, RuntimeOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "plugsmith")]
#[command(author, version, about = "Build, package and install host plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile plugins from the plugins directory
    Build {
        /// Plugin directory names (defaults to every plugin)
        names: Vec<String>,
        /// Build every plugin
        #[arg(long, conflicts_with = "names")]
        all: bool,
        #[arg(long)]
        no_minify: bool,
        #[arg(long)]
        no_sourcemap: bool,
        /// Also build example-* and demo-* plugins
        #[arg(long)]
        include_examples: bool,
        /// Package each plugin after compiling it
        #[arg(long)]
        package: bool,
        /// Add the source tree to packaged archives
        #[arg(long, requires = "package")]
        include_source: bool,
        /// Compiled output root
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Recompile a plugin whenever its sources change
    Watch {
        /// Plugin directory name under the plugins directory
        name: String,
        #[arg(long)]
        no_sourcemap: bool,
        /// Compiled output root
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Package a compiled plugin into a release archive
    Package {
        /// Compiled plugin directory
        compiled_dir: PathBuf,
        /// Release directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Plugin source directory
        #[arg(long)]
        source: Option<PathBuf>,
        /// Add the source directory under source/
        #[arg(long, requires = "source")]
        include_source: bool,
    },

    /// Check an archive against its metadata sidecar
    Verify {
        archive: PathBuf,
        /// Metadata file (defaults to the archive path with .json)
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Install a release archive
    Install {
        archive: PathBuf,
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
        /// Replace an existing install
        #[arg(long)]
        force: bool,
    },

    /// List installed plugins
    List {
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
    },

    /// Scaffold a new plugin
    Create {
        name: String,
        /// Include a native backend crate
        #[arg(long)]
        backend: bool,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
    },

    /// Run static checks on a compiled plugin
    Validate { compiled_dir: PathBuf },

    /// Print the manifest derived from a plugin source directory
    Manifest { source_dir: PathBuf },

    /// Load a plugin's native backend, run its health check, then unload it
    Probe {
        /// Plugin source, compiled or installed directory
        plugin_dir: PathBuf,
        /// Backend function to call (without the plugin_ prefix)
        #[arg(long)]
        call: Option<String>,
        /// JSON arguments for --call
        #[arg(long, requires = "call", default_value = "null")]
        args: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "plugsmith=debug"
    } else if cli.quiet {
        "plugsmith=warn"
    } else {
        "plugsmith=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Build {
            names,
            all,
            no_minify,
            no_sourcemap,
            include_examples,
            package,
            include_source,
            out_dir,
        } => {
            let selection = if all || names.is_empty() {
                BuildSelection::All
            } else {
                BuildSelection::Named(names)
            };
            let options = BuildOptions {
                plugins_dir: config.paths.plugins_dir.clone(),
                include_examples: include_examples || config.build.include_examples,
                package,
                include_source,
            };
            let compile = CompileOptions::default()
                .with_out_root(out_dir.unwrap_or_else(|| config.paths.dist_dir.clone()))
                .with_minify(config.build.minify && !no_minify)
                .with_sourcemap(config.build.sourcemap && !no_sourcemap);
            cmd_build(&config, options, compile, &selection, cli.format, cli.quiet).await
        }

        Commands::Watch {
            name,
            no_sourcemap,
            out_dir,
        } => {
            let compile = CompileOptions::default()
                .with_out_root(out_dir.unwrap_or_else(|| config.paths.dist_dir.clone()))
                .with_minify(false)
                .with_sourcemap(config.build.sourcemap && !no_sourcemap);
            cmd_watch(&config, &name, compile, cli.quiet).await
        }

        Commands::Package {
            compiled_dir,
            out_dir,
            source,
            include_source,
        } => {
            let release_dir = out_dir.unwrap_or_else(|| config.paths.release_dir.clone());
            let source = source.filter(|_| include_source);
            cmd_package(&compiled_dir, release_dir, source.as_deref(), cli.format, cli.quiet).await
        }

        Commands::Verify { archive, metadata } => {
            cmd_verify(&archive, metadata.as_deref(), cli.format, cli.quiet).await
        }

        Commands::Install {
            archive,
            plugins_dir,
            force,
        } => {
            let plugins_dir = plugins_dir.unwrap_or_else(|| config.paths.install_dir.clone());
            cmd_install(&archive, &plugins_dir, force, cli.quiet).await
        }

        Commands::List { plugins_dir } => {
            let plugins_dir = plugins_dir.unwrap_or_else(|| config.paths.install_dir.clone());
            cmd_list(&plugins_dir, cli.format).await
        }

        Commands::Create {
            name,
            backend,
            author,
            description,
            plugins_dir,
        } => {
            let plugins_dir = plugins_dir.unwrap_or_else(|| config.paths.plugins_dir.clone());
            let options = ScaffoldOptions {
                backend,
                author,
                description,
            };
            cmd_create(&plugins_dir, &name, &options, cli.quiet).await
        }

        Commands::Validate { compiled_dir } => cmd_validate(&compiled_dir, cli.format, cli.quiet).await,

        Commands::Manifest { source_dir } => cmd_manifest(&source_dir).await,

        Commands::Probe {
            plugin_dir,
            call,
            args,
        } => cmd_probe(&config, &plugin_dir, call.as_deref(), &args).await,

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

async fn cmd_build(
    config: &Config,
    options: BuildOptions,
    compile: CompileOptions,
    selection: &BuildSelection,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let compiler = configured_compiler(config, compile);
    let packager = Packager::new(
        PackageOptions::default().with_release_dir(config.paths.release_dir.clone()),
    );

    let report = BuildDriver::new(options, compiler, packager)
        .build(selection)
        .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report_json(&report))?),
        OutputFormat::Text if !quiet => print_report(&report),
        OutputFormat::Text => {}
    }

    if report.is_success() {
        Ok(())
    } else {
        bail!(
            "{} of {} plugins failed to build",
            report.failed.len(),
            report.total()
        )
    }
}

fn configured_compiler(config: &Config, compile: CompileOptions) -> Compiler {
    Compiler::new(compile)
        .with_bundler(Arc::new(EsbuildBundler::new(config.build.bundler.clone())))
        .with_toolchain(Arc::new(CargoToolchain::new(config.build.cargo.clone())))
}

async fn cmd_watch(
    config: &Config,
    name: &str,
    compile: CompileOptions,
    quiet: bool,
) -> anyhow::Result<()> {
    let source_dir = config.paths.plugins_dir.join(name);
    if !source_dir.is_dir() {
        return Err(plugsmith_core::Error::PluginNotFound(name.to_string()).into());
    }

    let watcher = DevWatcher::new(configured_compiler(config, compile), &source_dir);
    if !quiet {
        println!("Watching {} (Ctrl+C to stop)", source_dir.display());
    }
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    watcher
        .run(shutdown, |run| print_watch_compile(name, &run, quiet))
        .await?;
    Ok(())
}

fn print_watch_compile(name: &str, run: &WatchCompile, quiet: bool) {
    if let (Some(path), false) = (&run.trigger, quiet) {
        match run.changes {
            0 | 1 => println!("Changed: {}", path.display()),
            n => println!("Changed: {} (+{} more)", path.display(), n - 1),
        }
    }
    match &run.result {
        Ok(_) if quiet => {}
        Ok(compiled) => println!(
            "[OK] {} -> {} ({} ms)",
            name,
            compiled.output_dir.display(),
            run.elapsed.as_millis()
        ),
        Err(e) => {
            println!("[!!] {} [{}]: {}", name, e.code(), e);
            if let Some(hint) = e.suggestion() {
                println!("     {}", hint);
            }
        }
    }
}

fn print_report(report: &BuildReport) {
    if report.total() == 0 {
        println!("No plugins to build.");
        return;
    }
    for built in &report.succeeded {
        println!("[OK] {} -> {}", built.name, built.output_dir.display());
        if let Some(package) = &built.package {
            println!("     {}", package.archive_path.display());
        }
    }
    for (name, error) in &report.failed {
        println!("[!!] {} [{}]: {}", name, error.code(), error);
        if let Some(hint) = error.suggestion() {
            println!("     {}", hint);
        }
    }
    println!();
    println!(
        "Built {} of {} plugins.",
        report.succeeded.len(),
        report.total()
    );
}

fn report_json(report: &BuildReport) -> serde_json::Value {
    serde_json::json!({
        "succeeded": report.succeeded.iter().map(|b| serde_json::json!({
            "name": b.name,
            "outputDir": b.output_dir,
            "archive": b.package.as_ref().map(|p| &p.archive_path),
        })).collect::<Vec<_>>(),
        "failed": report.failed.iter().map(|(name, e)| serde_json::json!({
            "name": name,
            "code": e.code(),
            "error": e.to_string(),
        })).collect::<Vec<_>>(),
    })
}

async fn cmd_package(
    compiled_dir: &Path,
    release_dir: PathBuf,
    source: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let packager = Packager::new(PackageOptions::default().with_release_dir(release_dir));
    let outcome = packager.package_with_source(compiled_dir, source).await?;
    print_package(&outcome, format, quiet)
}

fn print_package(outcome: &PackageOutcome, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome.metadata)?),
        OutputFormat::Text if !quiet => {
            println!("Packaged {} {}", outcome.metadata.name, outcome.metadata.version);
            println!("  Archive:  {}", outcome.archive_path.display());
            println!("  Metadata: {}", outcome.metadata_path.display());
            println!("  Size:     {} bytes", outcome.metadata.size);
            println!("  SHA-256:  {}", outcome.metadata.checksum);
            println!("  Platform: {}", outcome.metadata.platform);
        }
        OutputFormat::Text => {}
    }
    Ok(())
}

async fn cmd_verify(
    archive: &Path,
    metadata: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let meta = verify_archive(archive, metadata).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&meta)?),
        OutputFormat::Text if !quiet => {
            println!("[OK] {} {} ({})", meta.name, meta.version, meta.file);
            println!("     {}: {}", meta.algorithm, meta.checksum);
        }
        OutputFormat::Text => {}
    }
    Ok(())
}

async fn cmd_install(
    archive: &Path,
    plugins_dir: &Path,
    force: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let installed = install_archive(archive, plugins_dir, force).await?;
    if !quiet {
        println!(
            "Installed {} {} to {}",
            installed.manifest.id,
            installed.manifest.version,
            installed.dir.display()
        );
    }
    Ok(())
}

async fn cmd_list(plugins_dir: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let installed = list_installed(plugins_dir).await?;
    match format {
        OutputFormat::Json => {
            let manifests: Vec<&PluginManifest> = installed.iter().map(|p| &p.manifest).collect();
            println!("{}", serde_json::to_string_pretty(&manifests)?);
        }
        OutputFormat::Text => {
            if installed.is_empty() {
                println!("No plugins installed in {}", plugins_dir.display());
            }
            for plugin in &installed {
                let backend = if plugin.manifest.backend.enabled {
                    " [backend]"
                } else {
                    ""
                };
                println!(
                    "{} {}{}",
                    plugin.manifest.id, plugin.manifest.version, backend
                );
            }
        }
    }
    Ok(())
}

async fn cmd_create(
    plugins_dir: &Path,
    name: &str,
    options: &ScaffoldOptions,
    quiet: bool,
) -> anyhow::Result<()> {
    let dir = create_plugin(plugins_dir, name, options).await?;
    if !quiet {
        println!("Created plugin {} at {}", name, dir.display());
        println!();
        println!("Next steps:");
        println!("  plugsmith build {}", dir.file_name().map(|n| n.to_string_lossy()).unwrap_or_default());
    }
    Ok(())
}

async fn cmd_validate(compiled_dir: &Path, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let report = validate_compiled(compiled_dir, &Platform::current()).await?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "ok": report.is_ok(),
                "errors": report.errors,
                "warnings": report.warnings,
            }))?
        ),
        OutputFormat::Text => {
            for error in &report.errors {
                println!("[!!] {}", error);
            }
            for warning in &report.warnings {
                println!("[..] {}", warning);
            }
            if report.is_ok() && !quiet {
                println!("[OK] {} is valid", compiled_dir.display());
            }
        }
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} failed validation with {} error(s)",
            compiled_dir.display(),
            report.errors.len()
        ))
    }
}

async fn cmd_manifest(source_dir: &Path) -> anyhow::Result<()> {
    let descriptor = DescriptorFile::load(source_dir)
        .await
        .with_context(|| format!("Failed to read plugin at {}", source_dir.display()))?
        .descriptor;
    descriptor.validate()?;
    let manifest = PluginManifest::derive(&descriptor).with_entry(COMPILED_ENTRY);
    println!("{}", manifest.to_json()?);
    Ok(())
}

async fn cmd_probe(
    config: &Config,
    plugin_dir: &Path,
    call: Option<&str>,
    args: &str,
) -> anyhow::Result<()> {
    let name = DescriptorFile::load(plugin_dir).await?.descriptor.name;
    let args: serde_json::Value =
        serde_json::from_str(args).context("--args must be valid JSON")?;

    let bridge = Arc::new(NativeBridge::new());
    let host = PluginHost::new(bridge.clone(), RuntimeOptions::from(&config.runtime));

    let Some(url) = host.runtime().start_backend(&name, plugin_dir).await else {
        bail!("No backend could be started for {}", name);
    };
    println!("Backend {} listening at {}", name, url);

    let outcome = probe_backend(&bridge, &name, call, &args).await;
    host.shutdown().await;
    outcome
}

async fn probe_backend(
    bridge: &NativeBridge,
    name: &str,
    call: Option<&str>,
    args: &serde_json::Value,
) -> anyhow::Result<()> {
    let healthy = bridge.health_check(name).await?;
    println!("Health check: {}", if healthy { "ok" } else { "failed" });

    if let Some(function) = call {
        let result = bridge.call(name, function, args).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if healthy {
        Ok(())
    } else {
        bail!("Backend {} reported unhealthy", name)
    }
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
