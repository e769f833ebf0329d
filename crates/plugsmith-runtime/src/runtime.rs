//! Backend lifecycle: start, stop and track native plugin backends
//!
//! Public operations never return errors. Failures are logged and reported
//! as `None` or as an `Error` status on the record.

use crate::bridge::{BackendHandle, HostBridge};
use crate::ports::{DEFAULT_BASE_PORT, PortAllocator};
use futures_util::future::join_all;
use plugsmith_core::compiler::toolchain::release_dir;
use plugsmith_core::compiler::{BACKEND_DIR, BACKEND_MANIFEST};
use plugsmith_core::config::RuntimeConfig;
use plugsmith_core::platform::native_library_name;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

/// How a plugin ships its backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// `backend/Cargo.toml`, library under `backend/target/release/`
    NativeSource,
    /// Library file directly under `backend/` (compiled or installed plugin)
    NativePrebuilt,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendProcessRecord {
    pub name: String,
    pub port: u16,
    pub url: String,
    pub status: BackendStatus,
    pub backend_type: Option<BackendType>,
    #[serde(skip)]
    pub handle: Option<BackendHandle>,
    #[serde(skip)]
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub base_port: u16,
    pub host: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            host: "localhost".to_string(),
        }
    }
}

impl From<&RuntimeConfig> for RuntimeOptions {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            base_port: config.base_port,
            host: config.host.clone(),
        }
    }
}

enum Reservation {
    Reserved { url: String, generation: u64 },
    Running(String),
    Unavailable,
}

struct RuntimeState {
    records: HashMap<String, BackendProcessRecord>,
    ports: PortAllocator,
    generation: u64,
}

impl RuntimeState {
    fn remove(&mut self, name: &str) -> Option<BackendProcessRecord> {
        let record = self.records.remove(name)?;
        self.ports.release(record.port);
        Some(record)
    }

    /// Record for `name`, only if it still belongs to the start that
    /// created `generation`
    fn current(&mut self, name: &str, generation: u64) -> Option<&mut BackendProcessRecord> {
        self.records
            .get_mut(name)
            .filter(|r| r.generation == generation)
    }
}

pub struct PluginRuntime {
    bridge: Arc<dyn HostBridge>,
    options: RuntimeOptions,
    state: Mutex<RuntimeState>,
}

impl PluginRuntime {
    pub fn new(bridge: Arc<dyn HostBridge>, options: RuntimeOptions) -> Self {
        let ports = PortAllocator::new(options.base_port);
        Self {
            bridge,
            options,
            state: Mutex::new(RuntimeState {
                records: HashMap::new(),
                ports,
                generation: 0,
            }),
        }
    }

    pub fn bridge(&self) -> &Arc<dyn HostBridge> {
        &self.bridge
    }

    /// Start the backend of the plugin at `plugin_path`. Returns the
    /// backend's base URL, or None when the plugin has no backend, a start
    /// is already in flight, or the backend failed to load.
    pub async fn start_backend(&self, name: &str, plugin_path: &Path) -> Option<String> {
        let backend_dir = plugin_path.join(BACKEND_DIR);
        if !self.bridge.path_exists(&backend_dir).await {
            debug!(plugin = name, "No backend directory");
            return None;
        }

        let (url, generation) = match self.reserve(name) {
            Reservation::Reserved { url, generation } => (url, generation),
            Reservation::Running(url) => return Some(url),
            Reservation::Unavailable => return None,
        };

        let platform = self.bridge.platform();
        let library_name = native_library_name(name, &platform);
        let Some((backend_type, library_path)) = self.detect(&backend_dir, &library_name).await else {
            warn!(plugin = name, dir = %backend_dir.display(), "Unsupported backend type");
            let mut state = self.lock();
            if state.current(name, generation).is_some() {
                state.remove(name);
            }
            return None;
        };

        info!(plugin = name, backend = ?backend_type, path = %library_path.display(), "Starting backend");
        match self.bridge.load_library(name, &library_path).await {
            Ok(handle) => {
                let adopted = {
                    let mut state = self.lock();
                    match state.current(name, generation) {
                        Some(record) => {
                            record.status = BackendStatus::Running;
                            record.backend_type = Some(backend_type);
                            record.handle = Some(handle);
                            true
                        }
                        None => false,
                    }
                };
                if adopted {
                    info!(plugin = name, url = %url, "Backend running");
                    return Some(url);
                }

                warn!(plugin = name, "Backend stopped while loading, unloading");
                if let Err(e) = self.bridge.unload(name).await {
                    error!(plugin = name, error = %e, "Failed to unload abandoned backend");
                }
                None
            }
            Err(e) => {
                error!(plugin = name, error = %e, "Failed to start backend");
                if let Some(record) = self.lock().current(name, generation) {
                    record.status = BackendStatus::Error;
                    record.backend_type = Some(backend_type);
                }
                None
            }
        }
    }

    /// Stop one backend. Unknown names are ignored.
    pub async fn stop_backend(&self, name: &str) {
        let generation = {
            let mut state = self.lock();
            let Some(record) = state.records.get(name) else {
                return;
            };
            if record.handle.is_none() {
                // Starting or failed: nothing is loaded yet
                debug!(plugin = name, status = ?record.status, "Dropping backend record");
                state.remove(name);
                return;
            }
            record.generation
        };

        match self.bridge.unload(name).await {
            Ok(()) => {
                let mut state = self.lock();
                if let Some(record) = state.current(name, generation) {
                    record.status = BackendStatus::Stopped;
                    state.remove(name);
                }
                info!(plugin = name, "Backend stopped");
            }
            Err(e) => {
                error!(plugin = name, error = %e, "Failed to stop backend");
                if let Some(record) = self.lock().current(name, generation) {
                    record.status = BackendStatus::Error;
                }
            }
        }
    }

    /// Stop every backend concurrently
    pub async fn stop_all_backends(&self) {
        let names: Vec<String> = self.lock().records.keys().cloned().collect();
        if names.is_empty() {
            return;
        }
        info!(count = names.len(), "Stopping all backends");
        join_all(names.iter().map(|name| self.stop_backend(name))).await;
    }

    pub fn status(&self, name: &str) -> Option<BackendStatus> {
        self.lock().records.get(name).map(|r| r.status)
    }

    /// Base URL of a running backend
    pub fn backend_url(&self, name: &str) -> Option<String> {
        self.lock()
            .records
            .get(name)
            .filter(|r| r.status == BackendStatus::Running)
            .map(|r| r.url.clone())
    }

    /// Snapshot of all records, sorted by name
    pub fn records(&self) -> Vec<BackendProcessRecord> {
        let mut records: Vec<_> = self.lock().records.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Check for an existing record and insert a `Starting` one, all under
    /// one lock
    fn reserve(&self, name: &str) -> Reservation {
        let mut state = self.lock();
        if let Some(record) = state.records.get(name) {
            match record.status {
                BackendStatus::Running => return Reservation::Running(record.url.clone()),
                BackendStatus::Starting => {
                    debug!(plugin = name, "Backend start already in flight");
                    return Reservation::Unavailable;
                }
                BackendStatus::Stopped | BackendStatus::Error => {}
            }
        }
        state.remove(name);

        let Some(port) = state.ports.allocate() else {
            error!(plugin = name, "No free port for backend");
            return Reservation::Unavailable;
        };
        state.generation += 1;
        let generation = state.generation;
        let url = format!("http://{}:{}", self.options.host, port);
        state.records.insert(
            name.to_string(),
            BackendProcessRecord {
                name: name.to_string(),
                port,
                url: url.clone(),
                status: BackendStatus::Starting,
                backend_type: None,
                handle: None,
                generation,
            },
        );
        Reservation::Reserved { url, generation }
    }

    async fn detect(&self, backend_dir: &Path, library_name: &str) -> Option<(BackendType, PathBuf)> {
        if self.bridge.path_exists(&backend_dir.join(BACKEND_MANIFEST)).await {
            return Some((
                BackendType::NativeSource,
                release_dir(backend_dir).join(library_name),
            ));
        }
        let prebuilt = backend_dir.join(library_name);
        if self.bridge.path_exists(&prebuilt).await {
            return Some((BackendType::NativePrebuilt, prebuilt));
        }
        None
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
