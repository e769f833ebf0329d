//! Plugsmith Core Library
//!
//! This crate provides the build side of the Plugsmith plugin pipeline:
//! - Plugin descriptors and derived load-time manifests
//! - Compiler (entry bundling, native backend build, asset copy)
//! - Packager (deterministic zip archives + checksum sidecars)
//! - Archive verification, installation and listing
//! - Scaffolding and static validation of plugins
//! - Batch builds over a plugins directory
//! - Watch mode recompiling a plugin on change
//! - Configuration

pub mod builder;
pub mod compiler;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fsutil;
pub mod install;
pub mod manifest;
pub mod packager;
pub mod platform;
pub mod scaffold;
pub mod validate;
pub mod watch;

pub use error::{Error, ErrorKind, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::builder::{BuildDriver, BuildOptions, BuildReport, BuildSelection};
    pub use crate::compiler::{CompileOptions, CompiledPlugin, Compiler};
    pub use crate::config::Config;
    pub use crate::descriptor::{DescriptorFile, PluginDescriptor};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::manifest::PluginManifest;
    pub use crate::packager::{ArchiveMetadata, PackageOptions, PackageOutcome, Packager};
    pub use crate::platform::{Platform, native_library_name};
}
