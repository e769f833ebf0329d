//! Plugsmith Plugin Runtime
//!
//! Everything a host application needs once plugins are installed:
//! - Hook wrapping, deep interception and safe execution
//! - An event bus shared between plugins
//! - Native backend loading through a host bridge (libloading by default)
//! - `PluginHost`, which owns the bus and the runtime for one application

pub mod bridge;
pub mod events;
pub mod hooks;
pub mod host;
pub mod ports;
pub mod proxy;
pub mod runtime;

pub use bridge::{BackendHandle, HostBridge, NativeBridge};
pub use events::{EventBus, Handler, Subscription};
pub use hooks::{
    AsyncHook, Hook, HookError, safe_execute, safe_execute_async, wrap_hook, wrap_hook_async,
};
pub use host::PluginHost;
pub use ports::PortAllocator;
pub use proxy::{DeepProxy, PropertyKey, ProxyHandler, ProxyValue};
pub use runtime::{BackendProcessRecord, BackendStatus, BackendType, PluginRuntime, RuntimeOptions};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to load library {path}: {message}")]
    LibraryLoad { path: PathBuf, message: String },

    #[error("Backend '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("Backend '{0}' is not loaded")]
    NotLoaded(String),

    #[error("Symbol '{symbol}' not found in backend '{plugin}'")]
    SymbolNotFound { plugin: String, symbol: String },

    #[error("Call to {plugin}::{function} failed: {message}")]
    Call {
        plugin: String,
        function: String,
        message: String,
    },

    #[error("Host bridge error: {0}")]
    Bridge(String),

    #[error("Runtime IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
