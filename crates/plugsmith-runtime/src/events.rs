//! Event bus shared between plugins
//!
//! Handlers are identified by their `Arc` pointer, so registering the same
//! handler twice for an event is a no-op.

use crate::hooks::HookError;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Event handler. Arguments are passed as JSON values.
pub type Handler = Arc<dyn Fn(&[Value]) -> Result<(), HookError> + Send + Sync>;

type HandlerMap = HashMap<String, Vec<Handler>>;

#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HandlerMap>>,
}

/// Registration returned by [`EventBus::on`]
#[must_use = "dropping a subscription keeps the handler registered"]
pub struct Subscription {
    bus: EventBus,
    event: String,
    handler: Handler,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove exactly this (event, handler) pair
    pub fn unsubscribe(self) {
        self.bus.off(&self.event, Some(&self.handler));
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut events: Vec<_> = handlers.keys().collect();
        events.sort();
        f.debug_struct("EventBus").field("events", &events).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`
    pub fn on(&self, event: impl Into<String>, handler: Handler) -> Subscription {
        let event = event.into();
        {
            let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
            let registered = handlers.entry(event.clone()).or_default();
            if !registered.iter().any(|h| Arc::ptr_eq(h, &handler)) {
                registered.push(handler.clone());
            }
        }
        debug!(event = %event, "Handler registered");
        Subscription {
            bus: self.clone(),
            event,
            handler,
        }
    }

    /// Invoke the handlers registered for `event` when the call starts.
    /// Handlers added or removed during dispatch do not affect this call.
    /// Returns how many handlers ran without failing.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(event) {
                Some(list) => list.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for handler in snapshot {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
                Ok(result) => result,
                Err(payload) => Err(HookError::from_panic(payload)),
            };
            match outcome {
                Ok(()) => delivered += 1,
                Err(e) => error!(event = %event, error = %e, "Event handler failed"),
            }
        }
        delivered
    }

    /// Remove one handler, or every handler of the event when `handler` is None
    pub fn off(&self, event: &str, handler: Option<&Handler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handler {
            None => {
                handlers.remove(event);
            }
            Some(target) => {
                if let Some(list) = handlers.get_mut(event) {
                    list.retain(|h| !Arc::ptr_eq(h, target));
                    if list.is_empty() {
                        handlers.remove(event);
                    }
                }
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(event).map_or(0, Vec::len)
    }

    /// Drop every handler of every event
    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder() -> (Handler, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Handler = Arc::new(move |args: &[Value]| {
            sink.lock().unwrap().extend(args.iter().cloned());
            Ok(())
        });
        (handler, seen)
    }

    #[test]
    fn test_emit_reaches_every_handler() {
        let bus = EventBus::new();
        let (a, seen_a) = recorder();
        let (b, seen_b) = recorder();
        let _sa = bus.on("chat:message", a);
        let _sb = bus.on("chat:message", b);

        assert_eq!(bus.emit("chat:message", &[json!("hello")]), 2);
        assert_eq!(*seen_a.lock().unwrap(), vec![json!("hello")]);
        assert_eq!(*seen_b.lock().unwrap(), vec![json!("hello")]);
        assert_eq!(bus.emit("nobody:listens", &[]), 0);
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        let _first = bus.on("tick", handler.clone());
        let _second = bus.on("tick", handler);

        assert_eq!(bus.listener_count("tick"), 1);
        bus.emit("tick", &[json!(1)]);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_pair() {
        let bus = EventBus::new();
        let (handler, seen) = recorder();
        let (other, _) = recorder();
        let on_tick = bus.on("tick", handler.clone());
        let _on_tock = bus.on("tock", handler);
        let _other = bus.on("tick", other);

        on_tick.unsubscribe();
        assert_eq!(bus.listener_count("tick"), 1);
        assert_eq!(bus.listener_count("tock"), 1);

        bus.emit("tock", &[json!("still here")]);
        assert_eq!(*seen.lock().unwrap(), vec![json!("still here")]);
    }

    #[test]
    fn test_failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::new();
        let failing: Handler = Arc::new(|_: &[Value]| Err(HookError::Failed("nope".into())));
        let panicking: Handler = Arc::new(|_: &[Value]| panic!("listener blew up"));
        let (healthy, seen) = recorder();

        let _f = bus.on("save", failing);
        let _p = bus.on("save", panicking);
        let _h = bus.on("save", healthy);

        assert_eq!(bus.emit("save", &[json!({"id": 1})]), 1);
        assert_eq!(*seen.lock().unwrap(), vec![json!({"id": 1})]);
        assert_eq!(bus.listener_count("save"), 3);
    }

    #[test]
    fn test_emit_uses_snapshot() {
        let bus = EventBus::new();
        let (late, late_seen) = recorder();
        let registering_bus = bus.clone();
        let late_handler = late.clone();
        let registrar: Handler = Arc::new(move |_: &[Value]| {
            let _ = registering_bus.on("boot", late_handler.clone());
            Ok(())
        });
        let _r = bus.on("boot", registrar);

        assert_eq!(bus.emit("boot", &[]), 1);
        assert!(late_seen.lock().unwrap().is_empty());
        assert_eq!(bus.listener_count("boot"), 2);
    }

    #[test]
    fn test_off_and_clear() {
        let bus = EventBus::new();
        let (a, _) = recorder();
        let (b, _) = recorder();
        let _a = bus.on("one", a.clone());
        let _b = bus.on("one", b);
        let _c = bus.on("two", a.clone());

        bus.off("one", Some(&a));
        assert_eq!(bus.listener_count("one"), 1);
        bus.off("one", None);
        assert_eq!(bus.listener_count("one"), 0);

        bus.clear();
        assert_eq!(bus.listener_count("two"), 0);
    }
}
