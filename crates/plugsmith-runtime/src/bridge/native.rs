//! In-process bridge built on `libloading`
//!
//! Backends export a C ABI:
//! - `plugin_init()` and `plugin_cleanup()` (both optional)
//! - `plugin_<function>(const char *json) -> char *` per callable function
//! - `plugin_free_string(char *)` to release returned strings
//! - `plugin_health_check() -> bool` (optional)

use super::{BackendHandle, HostBridge};
use crate::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use libloading::{Library, Symbol};
use plugsmith_core::platform::Platform;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

type InitFn = unsafe extern "C" fn();
type CleanupFn = unsafe extern "C" fn();
type CallFn = unsafe extern "C" fn(*const c_char) -> *mut c_char;
type FreeStringFn = unsafe extern "C" fn(*mut c_char);
type HealthCheckFn = unsafe extern "C" fn() -> bool;

struct LoadedBackend {
    library: Library,
    path: PathBuf,
}

/// Loads backends into the current process
#[derive(Clone, Default)]
pub struct NativeBridge {
    backends: Arc<Mutex<HashMap<String, Arc<LoadedBackend>>>>,
}

impl NativeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Call `plugin_<function>` with `args` serialized as JSON. A result
    /// that is not valid JSON is returned as a JSON string.
    pub async fn call(&self, name: &str, function: &str, args: &Value) -> RuntimeResult<Value> {
        let backend = self.get(name)?;
        let plugin = name.to_string();
        let function = function.to_string();
        let args = args.to_string();
        debug!(plugin = %plugin, function = %function, "Calling backend function");

        let output = run_blocking(move || call_blocking(&backend, &plugin, &function, &args)).await??;
        Ok(serde_json::from_str(&output).unwrap_or(Value::String(output)))
    }

    /// Run the backend's health check. Backends without one count as healthy.
    pub async fn health_check(&self, name: &str) -> RuntimeResult<bool> {
        let backend = self.get(name)?;
        let healthy = run_blocking(move || {
            // SAFETY: symbol type matches the exported health check ABI
            match unsafe { backend.library.get::<HealthCheckFn>(b"plugin_health_check") } {
                Ok(check) => unsafe { check() },
                Err(_) => true,
            }
        })
        .await?;
        if !healthy {
            warn!(plugin = name, "Backend health check failed");
        }
        Ok(healthy)
    }

    fn get(&self, name: &str) -> RuntimeResult<Arc<LoadedBackend>> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotLoaded(name.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<LoadedBackend>>> {
        self.backends.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HostBridge for NativeBridge {
    async fn path_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    fn platform(&self) -> Platform {
        Platform::current()
    }

    async fn load_library(&self, name: &str, path: &Path) -> RuntimeResult<BackendHandle> {
        if self.is_loaded(name) {
            return Err(RuntimeError::AlreadyLoaded(name.to_string()));
        }

        let library_path = path.to_path_buf();
        let backend = run_blocking(move || load_blocking(library_path)).await??;
        let handle = BackendHandle {
            name: name.to_string(),
            library_path: backend.path.clone(),
        };

        {
            let mut backends = self.lock();
            // A concurrent load of the same name won the race
            if backends.contains_key(name) {
                return Err(RuntimeError::AlreadyLoaded(name.to_string()));
            }
            backends.insert(name.to_string(), Arc::new(backend));
        }

        info!(plugin = name, path = %path.display(), "Backend loaded");
        Ok(handle)
    }

    async fn unload(&self, name: &str) -> RuntimeResult<()> {
        let backend = self
            .lock()
            .remove(name)
            .ok_or_else(|| RuntimeError::NotLoaded(name.to_string()))?;

        run_blocking(move || {
            // SAFETY: symbol type matches the exported cleanup ABI
            if let Ok(cleanup) = unsafe { backend.library.get::<CleanupFn>(b"plugin_cleanup") } {
                unsafe { cleanup() };
            }
            // The library closes once in-flight calls release their Arc
            drop(backend);
        })
        .await?;

        info!(plugin = name, "Backend unloaded");
        Ok(())
    }
}

fn load_blocking(path: PathBuf) -> RuntimeResult<LoadedBackend> {
    // SAFETY: loading runs the library's initializers; backends are trusted
    // code built by the plugin author
    let library = unsafe { Library::new(&path) }.map_err(|e| RuntimeError::LibraryLoad {
        path: path.clone(),
        message: e.to_string(),
    })?;

    // SAFETY: symbol type matches the exported init ABI
    if let Ok(init) = unsafe { library.get::<InitFn>(b"plugin_init") } {
        unsafe { init() };
    }

    Ok(LoadedBackend { library, path })
}

fn call_blocking(
    backend: &LoadedBackend,
    plugin: &str,
    function: &str,
    args: &str,
) -> RuntimeResult<String> {
    let symbol = format!("plugin_{}", function);
    let call_error = |message: String| RuntimeError::Call {
        plugin: plugin.to_string(),
        function: function.to_string(),
        message,
    };

    // SAFETY: symbol type matches the exported call ABI
    let func: Symbol<CallFn> = unsafe { backend.library.get(symbol.as_bytes()) }.map_err(|_| {
        RuntimeError::SymbolNotFound {
            plugin: plugin.to_string(),
            symbol: symbol.clone(),
        }
    })?;
    let input = CString::new(args).map_err(|e| call_error(format!("invalid arguments: {}", e)))?;

    // SAFETY: input outlives the call; the returned pointer is owned by the
    // backend until handed back to plugin_free_string
    let output = unsafe {
        let ptr = func(input.as_ptr());
        if ptr.is_null() {
            return Err(call_error("function returned null".to_string()));
        }
        let text = CStr::from_ptr(ptr).to_string_lossy().into_owned();
        match backend.library.get::<FreeStringFn>(b"plugin_free_string") {
            Ok(free) => free(ptr),
            Err(_) => warn!(plugin = plugin, "Backend exports no plugin_free_string, leaking result"),
        }
        text
    };
    Ok(output)
}

async fn run_blocking<T, F>(f: F) -> RuntimeResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RuntimeError::Io(std::io::Error::other(e)))
}
