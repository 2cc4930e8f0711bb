//! Process-wide registry of named implementations.
//!
//! Generated programs never embed code. They name an entry task, helper
//! functions, import locations and an output-transfer selector, and the
//! execution context resolves those names here when it boots.
//!
//! # Examples
//!
//! ```
//! use offload::{registry, ContextMap, ErrorObject};
//! use serde_json::{json, Value};
//!
//! registry().register_task("docs-add", |call| async move {
//!     let a = call.arg(0).and_then(Value::as_i64).unwrap_or(0);
//!     let b = call.arg(1).and_then(Value::as_i64).unwrap_or(0);
//!     Ok(json!(a + b))
//! });
//! registry().register_function("docs-square", |args| {
//!     let x = args.first().and_then(Value::as_f64).ok_or_else(|| ErrorObject::new("x"))?;
//!     Ok(json!(x * x))
//! });
//! registry().register_module("/js/docs.js", ContextMap::new().with("base", 10));
//!
//! assert!(registry().has_task("docs-add"));
//! assert!(registry().has_function("docs-square"));
//! assert!(registry().module("/js/docs.js").is_some());
//! ```

use std::future::Future;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::ErrorObject;
use crate::types::{ContextMap, OutputTransferSelector, TransferList};
use crate::worker::Invocation;

/// An entry task: receives one invocation and eventually yields a value.
pub type TaskFn =
    Arc<dyn Fn(Invocation) -> BoxFuture<'static, Result<Value, ErrorObject>> + Send + Sync>;

/// A helper function injected into contexts through the context map.
pub type HelperFn = Arc<dyn Fn(&[Value]) -> Result<Value, ErrorObject> + Send + Sync>;

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The process-wide registry.
pub fn registry() -> &'static Registry {
    &GLOBAL
}

/// Named implementations that execution contexts can resolve.
#[derive(Default)]
pub struct Registry {
    tasks: DashMap<String, TaskFn>,
    functions: DashMap<String, HelperFn>,
    modules: DashMap<String, ContextMap>,
    selectors: DashMap<String, OutputTransferSelector>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tasks", &self.tasks.len())
            .field("functions", &self.functions.len())
            .field("modules", &self.modules.len())
            .field("selectors", &self.selectors.len())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry task under `name`, replacing any previous one.
    pub fn register_task<F, Fut>(&self, name: impl Into<String>, task: F)
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        let task: TaskFn = Arc::new(move |call| task(call).boxed());
        self.tasks.insert(name.into(), task);
    }

    /// Registers a helper function that context maps can bind by name.
    pub fn register_function<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, ErrorObject> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Registers the bindings an import location provides.
    pub fn register_module(&self, location: impl Into<String>, bindings: ContextMap) {
        self.modules.insert(location.into(), bindings);
    }

    /// Registers an output-transfer selector.
    pub fn register_output_transfer<F>(&self, name: impl Into<String>, selector: F)
    where
        F: Fn(&Value) -> TransferList + Send + Sync + 'static,
    {
        self.selectors.insert(name.into(), Arc::new(selector));
    }

    /// Whether an entry task is registered under `name`.
    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Whether a helper function is registered under `name`.
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Whether an output-transfer selector is registered under `name`.
    pub fn has_output_transfer(&self, name: &str) -> bool {
        self.selectors.contains_key(name)
    }

    pub(crate) fn task(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).map(|entry| entry.value().clone())
    }

    pub(crate) fn function(&self, name: &str) -> Option<HelperFn> {
        self.functions.get(name).map(|entry| entry.value().clone())
    }

    /// The bindings provided by an import location.
    pub fn module(&self, location: &str) -> Option<ContextMap> {
        self.modules.get(location).map(|entry| entry.value().clone())
    }

    pub(crate) fn output_transfer(&self, name: &str) -> Option<OutputTransferSelector> {
        self.selectors.get(name).map(|entry| entry.value().clone())
    }
}
