//! Error types for Plugsmith

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using Plugsmith's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure class of an [`Error`]
///
/// Validation errors abort before any side effect, build errors abort the
/// compile of one plugin, packaging errors abort packaging without touching
/// the compiled output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Build,
    Packaging,
    Io,
}

/// Plugsmith error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (E001-E099)
    #[error("Missing required file: {0}")]
    MissingFile(String),

    #[error("Descriptor is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid plugin descriptor {path}: {reason}")]
    InvalidDescriptor { path: PathBuf, reason: String },

    #[error("No entry point found in {0} (looked for index.ts, index.js, src/index.ts, src/index.js)")]
    NoEntryPoint(PathBuf),

    #[error("Plugin '{0}' not found. Run `plugsmith list` to see installed plugins.")]
    PluginNotFound(String),

    #[error("Plugin '{0}' is already installed. Re-run with --force to overwrite.")]
    AlreadyInstalled(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Build errors (E100-E199)
    #[error("Bundling failed for {entry}: {message}")]
    Bundle { entry: PathBuf, message: String },

    #[error("Native backend build failed: {0}")]
    NativeBuild(String),

    #[error("Required tool '{0}' was not found on PATH")]
    ToolNotFound(String),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    // Packaging errors (E200-E299)
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Packaging failed: {0}")]
    Packaging(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile(_) => "E001",
            Self::MissingField(_) => "E002",
            Self::InvalidDescriptor { .. } => "E003",
            Self::NoEntryPoint(_) => "E004",
            Self::PluginNotFound(_) => "E005",
            Self::AlreadyInstalled(_) => "E006",
            Self::InvalidInput(_) => "E007",
            Self::Bundle { .. } => "E100",
            Self::NativeBuild(_) => "E101",
            Self::ToolNotFound(_) => "E102",
            Self::Watch(_) => "E103",
            Self::Archive(_) => "E200",
            Self::ChecksumMismatch { .. } => "E201",
            Self::Packaging(_) => "E202",
            Self::Config(_) => "E600",
            Self::Json(_) => "E601",
            Self::Io(_) => "E9999",
        }
    }

    /// Failure class used by batch drivers and the CLI
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFile(_)
            | Self::MissingField(_)
            | Self::InvalidDescriptor { .. }
            | Self::NoEntryPoint(_)
            | Self::PluginNotFound(_)
            | Self::AlreadyInstalled(_)
            | Self::InvalidInput(_)
            | Self::Config(_)
            | Self::Json(_) => ErrorKind::Validation,
            Self::Bundle { .. }
            | Self::NativeBuild(_)
            | Self::ToolNotFound(_)
            | Self::Watch(_) => ErrorKind::Build,
            Self::Archive(_) | Self::ChecksumMismatch { .. } | Self::Packaging(_) => {
                ErrorKind::Packaging
            }
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::MissingFile(file) if file == "index.js" || file == "package.json" => {
                Some("Run `plugsmith build <name>` before packaging".to_string())
            }
            Self::NoEntryPoint(_) => Some("Add an index.ts or index.js to the plugin root".to_string()),
            Self::PluginNotFound(_) => Some("plugsmith list".to_string()),
            Self::AlreadyInstalled(_) => Some("plugsmith install <archive> --force".to_string()),
            Self::ToolNotFound(tool) if tool == "esbuild" => {
                Some("npm install -g esbuild, or set build.bundler in plugsmith.toml".to_string())
            }
            Self::ToolNotFound(tool) => Some(format!("Install {} and make sure it is on PATH", tool)),
            Self::ChecksumMismatch { .. } => {
                Some("Re-download the archive or re-run `plugsmith package`".to_string())
            }
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}
