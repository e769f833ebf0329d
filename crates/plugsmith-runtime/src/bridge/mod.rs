//! Host bridge: the seam between the runtime and the process that actually
//! loads native code

mod native;

pub use native::NativeBridge;

use crate::RuntimeResult;
use async_trait::async_trait;
use plugsmith_core::platform::Platform;
use std::path::{Path, PathBuf};

/// A loaded backend, as reported by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHandle {
    pub name: String,
    pub library_path: PathBuf,
}

/// Capabilities the runtime needs from its host
#[async_trait]
pub trait HostBridge: Send + Sync {
    async fn path_exists(&self, path: &Path) -> bool;

    /// Platform native libraries are loaded on
    fn platform(&self) -> Platform;

    /// Load the library at `path` and register it under `name`
    async fn load_library(&self, name: &str, path: &Path) -> RuntimeResult<BackendHandle>;

    /// Unload the backend registered under `name`
    async fn unload(&self, name: &str) -> RuntimeResult<()>;
}
