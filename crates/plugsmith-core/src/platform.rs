//! Host platform identification and the native library naming convention
//!
//! Native backends are never cross-compiled, so the platform that matters is
//! always the one the current process runs on. The same naming rule is used
//! when the compiler copies a freshly built library, when the packager
//! detects a backend, and when the runtime locates the library to load.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system family a native backend was built for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    /// Any other Unix-like target, carrying the raw OS name
    Other(String),
}

impl Platform {
    /// Platform of the running process
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a Rust OS identifier (`std::env::consts::OS`) or an archive token
    /// back to a platform
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" | "win32" => Self::Windows,
            "macos" | "darwin" => Self::MacOs,
            "linux" => Self::Linux,
            other => Self::Other(other.to_string()),
        }
    }

    /// Token used in archive names and metadata (`win32`, `darwin`, `linux`)
    pub fn token(&self) -> &str {
        match self {
            Self::Windows => "win32",
            Self::MacOs => "darwin",
            Self::Linux => "linux",
            Self::Other(os) => os,
        }
    }

    fn library_affixes(&self) -> (&'static str, &'static str) {
        match self {
            Self::Windows => ("", "dll"),
            Self::MacOs => ("lib", "dylib"),
            Self::Linux | Self::Other(_) => ("lib", "so"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Reduce a plugin name to the identifier cargo would use for its library.
///
/// The npm scope is dropped, the rest is lowercased, and anything that is
/// not ASCII alphanumeric becomes `_`.
pub fn library_stem(plugin_name: &str) -> String {
    let unscoped = plugin_name
        .rsplit_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or(plugin_name);

    unscoped
        .trim_start_matches('@')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Cargo `[lib] name` a backend crate must declare to match the convention
pub fn library_crate_name(plugin_name: &str) -> String {
    format!("{}_plugin", library_stem(plugin_name))
}

/// File name of a plugin's native library on `platform`.
///
/// `bilibili-emoji` becomes `libbilibili_emoji_plugin.so` on Linux,
/// `libbilibili_emoji_plugin.dylib` on macOS and
/// `bilibili_emoji_plugin.dll` on Windows.
pub fn native_library_name(plugin_name: &str, platform: &Platform) -> String {
    let (prefix, extension) = platform.library_affixes();
    format!("{}{}.{}", prefix, library_crate_name(plugin_name), extension)
}
