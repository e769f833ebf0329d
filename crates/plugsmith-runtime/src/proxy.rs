//! Deep interception over a shared JSON value
//!
//! A `DeepProxy` is a view into one location of a shared root value. Reads
//! of composite values come back as nested proxies over the same root and
//! handler, so interception applies at every depth.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// One step into a JSON value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Field(String),
    Index(usize),
}

impl From<&str> for PropertyKey {
    fn from(key: &str) -> Self {
        Self::Field(key.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(key: String) -> Self {
        Self::Field(key)
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{}", name),
            Self::Index(i) => write!(f, "[{}]", i),
        }
    }
}

type GetFn = dyn Fn(&Value, &PropertyKey) -> Option<Value> + Send + Sync;
type SetFn = dyn Fn(&mut Value, &PropertyKey, Value) -> bool + Send + Sync;

/// Optional interception capabilities. A missing capability falls back to
/// the default read or write.
#[derive(Default)]
pub struct ProxyHandler {
    get: Option<Box<GetFn>>,
    set: Option<Box<SetFn>>,
}

impl ProxyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intercept reads. The target passed in is a copy of the value the
    /// proxy points at; the returned value is handed out as-is.
    pub fn with_get<F>(mut self, get: F) -> Self
    where
        F: Fn(&Value, &PropertyKey) -> Option<Value> + Send + Sync + 'static,
    {
        self.get = Some(Box::new(get));
        self
    }

    /// Intercept writes. Returns whether the write was accepted.
    ///
    /// The handler runs while the root is write-locked, so it must not go
    /// through any [`DeepProxy`] sharing the same root.
    pub fn with_set<F>(mut self, set: F) -> Self
    where
        F: Fn(&mut Value, &PropertyKey, Value) -> bool + Send + Sync + 'static,
    {
        self.set = Some(Box::new(set));
        self
    }
}

impl fmt::Debug for ProxyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandler")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

/// Result of a proxied read
#[derive(Debug, Clone)]
pub enum ProxyValue {
    /// Scalar, or whatever a custom `get` returned
    Plain(Value),
    /// Object or array, wrapped for further interception
    Proxy(DeepProxy),
}

impl ProxyValue {
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(v) => Some(v),
            Self::Proxy(_) => None,
        }
    }

    pub fn into_proxy(self) -> Option<DeepProxy> {
        match self {
            Self::Proxy(p) => Some(p),
            Self::Plain(_) => None,
        }
    }

    /// Materialize the value, taking a snapshot for nested proxies
    pub fn into_value(self) -> Value {
        match self {
            Self::Plain(v) => v,
            Self::Proxy(p) => p.snapshot().unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeepProxy {
    root: Arc<RwLock<Value>>,
    path: Vec<PropertyKey>,
    handler: Option<Arc<ProxyHandler>>,
}

impl DeepProxy {
    pub fn new(value: Value, handler: Option<ProxyHandler>) -> Self {
        Self::from_shared(Arc::new(RwLock::new(value)), handler.map(Arc::new))
    }

    pub fn from_shared(root: Arc<RwLock<Value>>, handler: Option<Arc<ProxyHandler>>) -> Self {
        Self {
            root,
            path: Vec::new(),
            handler,
        }
    }

    /// Location of this view inside the root
    pub fn path(&self) -> &[PropertyKey] {
        &self.path
    }

    /// The shared root value
    pub fn root(&self) -> Arc<RwLock<Value>> {
        self.root.clone()
    }

    /// Read `key` from the value this proxy points at
    pub fn get(&self, key: impl Into<PropertyKey>) -> Option<ProxyValue> {
        let key = key.into();
        if let Some(get) = self.handler.as_ref().and_then(|h| h.get.as_ref()) {
            // the handler sees a copy so it may read the root through other proxies
            let target = self.snapshot()?;
            return get(&target, &key).map(ProxyValue::Plain);
        }

        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        let target = resolve(&root, &self.path)?;

        let value = read(target, &key)?;
        if value.is_object() || value.is_array() {
            let mut path = self.path.clone();
            path.push(key);
            Some(ProxyValue::Proxy(Self {
                root: self.root.clone(),
                path,
                handler: self.handler.clone(),
            }))
        } else {
            Some(ProxyValue::Plain(value.clone()))
        }
    }

    /// Write `value` at `key`. Returns false when the write was rejected or
    /// the location does not exist.
    pub fn set(&self, key: impl Into<PropertyKey>, value: Value) -> bool {
        let key = key.into();
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        let Some(target) = resolve_mut(&mut root, &self.path) else {
            return false;
        };

        match self.handler.as_ref().and_then(|h| h.set.as_ref()) {
            Some(set) => set(target, &key, value),
            None => write(target, key, value),
        }
    }

    /// Clone of the value this proxy points at
    pub fn snapshot(&self) -> Option<Value> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        resolve(&root, &self.path).cloned()
    }
}

fn read<'a>(target: &'a Value, key: &PropertyKey) -> Option<&'a Value> {
    match (target, key) {
        (Value::Object(map), PropertyKey::Field(name)) => map.get(name),
        (Value::Array(items), PropertyKey::Index(i)) => items.get(*i),
        _ => None,
    }
}

fn write(target: &mut Value, key: PropertyKey, value: Value) -> bool {
    match (target, key) {
        (Value::Object(map), PropertyKey::Field(name)) => {
            map.insert(name, value);
            true
        }
        (Value::Array(items), PropertyKey::Index(i)) if i < items.len() => {
            items[i] = value;
            true
        }
        (Value::Array(items), PropertyKey::Index(i)) if i == items.len() => {
            items.push(value);
            true
        }
        _ => false,
    }
}

fn resolve<'a>(root: &'a Value, path: &[PropertyKey]) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, key| read(value, key))
}

fn resolve_mut<'a>(root: &'a mut Value, path: &[PropertyKey]) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |value, key| match (value, key) {
        (Value::Object(map), PropertyKey::Field(name)) => map.get_mut(name),
        (Value::Array(items), PropertyKey::Index(i)) => items.get_mut(*i),
        _ => None,
    })
}
