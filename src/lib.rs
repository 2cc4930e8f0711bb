//! # offload
//!
//! Offload computations to isolated execution contexts.
//!
//! A context is an independently scheduled thread of control that shares no
//! memory with the caller. Values cross the boundary by copy and binary
//! buffers by move. This crate generates the program a context boots from
//! and speaks a correlated request/response protocol with it. It also
//! schedules calls across contexts.
//!
//! # Overview
//!
//! - Register an entry task (and any helper functions or import modules) in
//!   the process-wide [`registry`].
//! - Describe the work with [`Task::builder`]: context bindings, imports,
//!   a root path for relative imports and transfer selectors.
//! - Build a handle:
//!   - [`ExclusiveTask`] starts a fresh context per call.
//!   - [`SharedTask`] multiplexes calls over one context.
//!   - [`Pool`] bounds a set of shared handles behind queued, timed
//!     acquisition.
//! - Call it through [`TaskHandle`].
//!
//! # Example
//!
//! ```
//! use offload::{registry, ContextMap, ContextValue, ErrorObject, Task, TaskHandle};
//! use serde_json::{json, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> offload::Result<()> {
//! registry().register_function("lib-double", |args| {
//!     let x = args.first().and_then(Value::as_f64).ok_or_else(|| ErrorObject::new("x"))?;
//!     Ok(json!(x * 2.0))
//! });
//! registry().register_task("lib-apply", |call| async move {
//!     let x = call.arg(0).cloned().unwrap_or_default();
//!     call.call("double", &[x])
//! });
//!
//! let task = Task::builder("lib-apply")
//!     .context(ContextMap::new().with("double", ContextValue::function("lib-double")))
//!     .exclusive()?;
//! assert_eq!(task.run(vec![json!(21)]).await?, json!(42.0));
//! task.kill();
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`program`] - Program generation from a task descriptor
//! - [`registry`](mod@registry) - Named entry tasks, helpers, modules and selectors
//! - [`task`] - Exclusive and shared handles
//! - [`pool`] - Bounded pool of shared handles
//! - [`host`] - Program publication and execution-context lifecycle
//! - [`types`] - Context maps, envelopes and transfer lists
//! - [`config`] - Pool configuration from TOML and environment
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod host;
pub mod pool;
pub mod program;
pub mod registry;
pub mod task;
pub mod types;
pub mod worker;

pub(crate) mod channel;

#[cfg(feature = "logging")]
pub mod logging;

// Re-exports for ergonomic access
pub use config::{ConfigError, PoolConfig};
pub use error::{Error, ErrorObject, Result, SerializationError};
pub use pool::{Pool, PoolGuard};
pub use program::{GeneratedProgram, Program};
pub use registry::{registry, Registry};
pub use task::{ExclusiveTask, SharedTask, Task, TaskBuilder, TaskDescriptor, TaskHandle};
pub use types::{Completion, ContextMap, ContextValue, TransferList};
pub use worker::{Invocation, Scope};

#[cfg(feature = "logging")]
pub use logging::init_logging;
