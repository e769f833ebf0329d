//! Composition root for one host application

use crate::bridge::{HostBridge, NativeBridge};
use crate::events::EventBus;
use crate::runtime::{PluginRuntime, RuntimeOptions};
use plugsmith_core::config::Config;
use std::sync::Arc;
use tracing::info;

/// Owns the event bus and backend runtime shared by every plugin of one
/// application
pub struct PluginHost {
    events: EventBus,
    runtime: PluginRuntime,
}

impl PluginHost {
    pub fn new(bridge: Arc<dyn HostBridge>, options: RuntimeOptions) -> Self {
        Self {
            events: EventBus::new(),
            runtime: PluginRuntime::new(bridge, options),
        }
    }

    /// Host loading backends in-process, configured from `config`
    pub fn native(config: &Config) -> Self {
        Self::new(
            Arc::new(NativeBridge::new()),
            RuntimeOptions::from(&config.runtime),
        )
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn runtime(&self) -> &PluginRuntime {
        &self.runtime
    }

    /// Stop every backend and drop every event handler
    pub async fn shutdown(&self) {
        info!("Shutting down plugin host");
        self.runtime.stop_all_backends().await;
        self.events.clear();
    }
}
