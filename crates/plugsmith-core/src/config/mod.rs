//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Project-local config file name, looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "plugsmith.toml";

/// Plugsmith configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub build: BuildConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one sub-directory per plugin source tree
    pub plugins_dir: PathBuf,
    /// Compiled output root (`<dist_dir>/<plugin>`)
    pub dist_dir: PathBuf,
    /// Where archives and metadata sidecars are written
    pub release_dir: PathBuf,
    /// Where `plugsmith install` extracts archives
    pub install_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub minify: bool,
    pub sourcemap: bool,
    /// Bundler executable
    pub bundler: String,
    /// Cargo executable used for native backends
    pub cargo: String,
    pub include_examples: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// First port handed to a plugin backend
    pub base_port: u16,
    pub host: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from("plugins"),
            dist_dir: PathBuf::from("dist/plugins"),
            release_dir: PathBuf::from("releases/plugins"),
            install_dir: PathBuf::from("installed-plugins"),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            minify: true,
            sourcemap: true,
            bundler: "esbuild".to_string(),
            cargo: "cargo".to_string(),
            include_examples: false,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_port: 13000,
            host: "localhost".to_string(),
        }
    }
}

const KEYS: &[&str] = &[
    "paths.plugins_dir",
    "paths.dist_dir",
    "paths.release_dir",
    "paths.install_dir",
    "build.minify",
    "build.sourcemap",
    "build.bundler",
    "build.cargo",
    "build.include_examples",
    "runtime.base_port",
    "runtime.host",
];

impl Config {
    /// Get the user config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("plugsmith");
        Ok(dir)
    }

    /// Resolve the config file path.
    ///
    /// Lookup order: `PLUGSMITH_CONFIG`, `./plugsmith.toml`, then the user
    /// config directory.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        if let Ok(explicit) = env::var("PLUGSMITH_CONFIG") {
            return Ok(PathBuf::from(explicit));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }

        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to the resolved config path
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.base_port == 0 {
            return Err(anyhow!("runtime.base_port must be greater than zero"));
        }
        if self.build.bundler.trim().is_empty() {
            return Err(anyhow!("build.bundler cannot be empty"));
        }
        if self.build.cargo.trim().is_empty() {
            return Err(anyhow!("build.cargo cannot be empty"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "paths.plugins_dir" => Ok(self.paths.plugins_dir.display().to_string()),
            "paths.dist_dir" => Ok(self.paths.dist_dir.display().to_string()),
            "paths.release_dir" => Ok(self.paths.release_dir.display().to_string()),
            "paths.install_dir" => Ok(self.paths.install_dir.display().to_string()),
            "build.minify" => Ok(self.build.minify.to_string()),
            "build.sourcemap" => Ok(self.build.sourcemap.to_string()),
            "build.bundler" => Ok(self.build.bundler.clone()),
            "build.cargo" => Ok(self.build.cargo.clone()),
            "build.include_examples" => Ok(self.build.include_examples.to_string()),
            "runtime.base_port" => Ok(self.runtime.base_port.to_string()),
            "runtime.host" => Ok(self.runtime.host.clone()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `plugsmith config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "paths.plugins_dir" => self.paths.plugins_dir = PathBuf::from(value),
            "paths.dist_dir" => self.paths.dist_dir = PathBuf::from(value),
            "paths.release_dir" => self.paths.release_dir = PathBuf::from(value),
            "paths.install_dir" => self.paths.install_dir = PathBuf::from(value),
            "build.minify" => self.build.minify = parse_bool(key, value)?,
            "build.sourcemap" => self.build.sourcemap = parse_bool(key, value)?,
            "build.include_examples" => self.build.include_examples = parse_bool(key, value)?,
            "build.bundler" => self.build.bundler = value.to_string(),
            "build.cargo" => self.build.cargo = value.to_string(),
            "runtime.base_port" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Invalid base_port value: {}", value))?;
                if port == 0 {
                    return Err(anyhow!("Base port must be greater than zero"));
                }
                self.runtime.base_port = port;
            }
            "runtime.host" => self.runtime.host = value.to_string(),
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `plugsmith config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("Invalid boolean for {}: {}", key, value)),
    }
}
