//! Task handles: the public units of offloaded work.
//!
//! A handle is built once from a [`TaskDescriptor`] and then called any
//! number of times. Two strategies are available:
//!
//! - [`ExclusiveTask`] starts a fresh execution context for every call.
//! - [`SharedTask`] keeps one context alive and multiplexes calls over it.
//!
//! A [`Pool`](crate::Pool) bounds a set of shared handles. All three
//! implement [`TaskHandle`].
//!
//! # Examples
//!
//! ```
//! use offload::{registry, ContextMap, Task, TaskHandle};
//! use serde_json::{json, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> offload::Result<()> {
//! registry().register_task("docs-sum", |call| async move {
//!     let offset = call.get("offset").and_then(Value::as_i64).unwrap_or(0);
//!     let total: i64 = call.args().iter().filter_map(Value::as_i64).sum();
//!     Ok(json!(total + offset))
//! });
//!
//! let task = Task::builder("docs-sum")
//!     .context(ContextMap::new().with("offset", 100))
//!     .shared()?;
//! assert_eq!(task.run(vec![json!(1), json!(2)]).await?, json!(103));
//! task.kill();
//! # Ok(())
//! # }
//! ```

mod exclusive;
mod shared;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use exclusive::ExclusiveTask;
pub use shared::SharedTask;

use crate::config::PoolConfig;
use crate::error::Result;
use crate::pool::Pool;
use crate::program::{generate, GeneratedProgram};
use crate::types::{Completion, ContextMap, InputTransferSelector, TransferList};

/// Operations common to every handle.
#[async_trait]
pub trait TaskHandle: Send + Sync {
    /// Runs the entry task with `args` and resolves with its result.
    ///
    /// # Errors
    ///
    /// [`Error::Execution`](crate::Error::Execution) when the task fails,
    /// [`Error::Killed`](crate::Error::Killed) after [`kill`](Self::kill),
    /// and for pools the acquisition errors.
    async fn run(&self, args: Vec<Value>) -> Result<Value> {
        Ok(self.run_with_transfer(args).await?.value)
    }

    /// Like [`run`](Self::run), also returning the buffers the output
    /// selector moved back.
    async fn run_with_transfer(&self, args: Vec<Value>) -> Result<Completion>;

    /// Releases every resource the handle owns. Safe to call repeatedly.
    fn kill(&self);

    /// Builds an independent handle of the same kind that reuses the
    /// already-generated program.
    fn fork(&self) -> Result<Self>
    where
        Self: Sized;
}

/// What to run and what to install around it. Immutable once built.
#[derive(Clone, Default)]
pub struct TaskDescriptor {
    entry: String,
    context: ContextMap,
    imports: Vec<String>,
    root_path: Option<String>,
    input_transfer: Option<InputTransferSelector>,
    output_transfer: Option<String>,
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("entry", &self.entry)
            .field("context", &self.context)
            .field("imports", &self.imports)
            .field("root_path", &self.root_path)
            .field("input_transfer", &self.input_transfer.is_some())
            .field("output_transfer", &self.output_transfer)
            .finish()
    }
}

impl TaskDescriptor {
    /// Registered name of the entry task.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Bindings installed before the entry task.
    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    /// Import locations, unresolved.
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// Base for relative import locations.
    pub fn root_path(&self) -> Option<&str> {
        self.root_path.as_deref()
    }

    pub(crate) fn generate(&self, self_terminate: bool) -> Result<GeneratedProgram> {
        Ok(generate(
            &self.entry,
            &self.context,
            &self.imports,
            self.root_path.as_deref(),
            self.output_transfer.as_deref(),
            self_terminate,
        )?)
    }

    /// Buffers to move with a call, picked on the caller's side.
    pub(crate) fn select_transfer(&self, args: &[Value]) -> TransferList {
        self.input_transfer
            .as_ref()
            .map(|select| select(args))
            .unwrap_or_default()
    }
}

/// Entry point for building handles.
#[derive(Debug, Clone, Copy)]
pub struct Task;

impl Task {
    /// Starts a builder for the entry task registered under `entry`.
    pub fn builder(entry: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            descriptor: TaskDescriptor {
                entry: entry.into(),
                ..TaskDescriptor::default()
            },
        }
    }
}

/// Builder for [`TaskDescriptor`] and the handles made from it.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    descriptor: TaskDescriptor,
}

impl TaskBuilder {
    /// Replaces the context map.
    #[must_use]
    pub fn context(mut self, context: ContextMap) -> Self {
        self.descriptor.context = context;
        self
    }

    /// Adds one import location.
    #[must_use]
    pub fn import(mut self, location: impl Into<String>) -> Self {
        self.descriptor.imports.push(location.into());
        self
    }

    /// Adds several import locations, in order.
    #[must_use]
    pub fn imports<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor
            .imports
            .extend(locations.into_iter().map(Into::into));
        self
    }

    /// Base path that relative import locations are resolved against.
    #[must_use]
    pub fn root_path(mut self, root: impl Into<String>) -> Self {
        self.descriptor.root_path = Some(root.into());
        self
    }

    /// Picks buffers to move with each call from its arguments.
    #[must_use]
    pub fn input_transfer<F>(mut self, select: F) -> Self
    where
        F: Fn(&[Value]) -> TransferList + Send + Sync + 'static,
    {
        self.descriptor.input_transfer = Some(Arc::new(select));
        self
    }

    /// Names a registered selector that picks buffers to move back with
    /// each result.
    #[must_use]
    pub fn output_transfer(mut self, selector: impl Into<String>) -> Self {
        self.descriptor.output_transfer = Some(selector.into());
        self
    }

    /// Finishes the descriptor without building a handle.
    pub fn build(self) -> TaskDescriptor {
        self.descriptor
    }

    /// Builds a handle that starts a fresh context per call.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`](crate::Error::Serialization) when the
    /// descriptor cannot be turned into a program.
    pub fn exclusive(self) -> Result<ExclusiveTask> {
        ExclusiveTask::new(self.descriptor)
    }

    /// Builds a handle over one long-lived context.
    ///
    /// # Errors
    ///
    /// As for [`exclusive`](Self::exclusive), plus
    /// [`Error::Spawn`](crate::Error::Spawn) when the context cannot start.
    pub fn shared(self) -> Result<SharedTask> {
        SharedTask::new(self.descriptor)
    }

    /// Builds a pool of shared handles.
    ///
    /// # Errors
    ///
    /// As for [`shared`](Self::shared).
    pub fn pool(self, config: PoolConfig) -> Result<Pool> {
        Pool::new(self.descriptor, config)
    }
}
