//! Error types for offloaded task execution.
//!
//! [`Error`] is the single error type surfaced by handles and pools. Errors
//! raised inside an execution context cannot cross the boundary as live
//! objects, so they travel as an [`ErrorObject`]: the error's properties
//! copied one by one into a JSON value and rebuilt on the caller's side.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ConfigError;

/// Result type alias for offload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building or running offloaded tasks.
///
/// # Examples
///
/// ```
/// use offload::{Error, ErrorObject};
/// use std::time::Duration;
///
/// let err = Error::AcquisitionTimeout { timeout: Duration::from_millis(30) };
/// assert!(err.to_string().contains("30ms"));
///
/// let err = Error::Execution(ErrorObject::new("Test error"));
/// assert_eq!(err.to_string(), "execution failed: Test error");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A context binding, entry task or selector cannot be represented in a
    /// generated program. Raised while the handle is built, never at call time.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The entry function failed, or its execution context could not start.
    #[error("execution failed: {0}")]
    Execution(ErrorObject),

    /// No pool member became available before the acquisition timer expired.
    #[error("no execution context available, timeout of {}ms exceeded", .timeout.as_millis())]
    AcquisitionTimeout {
        /// The configured acquisition timeout.
        timeout: Duration,
    },

    /// The pool was killed while the acquisition was pending, or before it began.
    #[error("pool has been killed")]
    PoolKilled,

    /// The handle was killed before the call was issued.
    #[error("task handle has been killed")]
    Killed,

    /// The execution context went away before answering.
    #[error("execution context terminated before responding")]
    Terminated,

    /// The host could not create an execution context.
    #[error("failed to spawn execution context: {0}")]
    Spawn(#[source] std::io::Error),

    /// A frame on the channel could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Returns the reconstructed error when this is an [`Error::Execution`].
    pub fn as_execution(&self) -> Option<&ErrorObject> {
        match self {
            Self::Execution(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// A context binding or program slot that has no representation in a
/// generated program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot serialize `{binding}`: {reason}")]
pub struct SerializationError {
    /// Name of the offending binding or slot.
    pub binding: String,
    /// Why it cannot be represented.
    pub reason: String,
}

impl SerializationError {
    pub(crate) fn new(binding: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            binding: binding.into(),
            reason: reason.into(),
        }
    }
}

/// An error reconstructed on the receiving side of the context boundary.
///
/// Usually an object holding at least a `message` property. A rejection
/// with a plain value (say, a bare string) is kept as that raw value.
///
/// # Examples
///
/// ```
/// use offload::ErrorObject;
/// use serde_json::json;
///
/// let err = ErrorObject::new("Test error").with_property("code", json!(42));
/// assert_eq!(err.message(), Some("Test error"));
/// assert_eq!(err.get("code"), Some(&json!(42)));
///
/// let raw = ErrorObject::from_value(json!("Test error"));
/// assert_eq!(raw.message(), Some("Test error"));
/// assert_eq!(raw.as_value(), &json!("Test error"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorObject(Value);

impl ErrorObject {
    /// Creates an `Error`-named object with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// Creates an object with an explicit `name` and `message`.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut props = Map::new();
        props.insert("name".to_string(), Value::String(name.into()));
        props.insert("message".to_string(), Value::String(message.into()));
        Self(Value::Object(props))
    }

    /// Wraps an arbitrary rejection value.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Adds or replaces a property. A non-object value is first wrapped
    /// into an object whose `message` is its string form.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        if !self.0.is_object() {
            let message = display_value(&self.0);
            self = Self::new(message);
        }
        if let Value::Object(props) = &mut self.0 {
            props.insert(key.into(), value);
        }
        self
    }

    /// The `message` property, or the raw string if the rejection was one.
    pub fn message(&self) -> Option<&str> {
        match &self.0 {
            Value::String(s) => Some(s),
            Value::Object(props) => props.get("message").and_then(Value::as_str),
            _ => None,
        }
    }

    /// The `name` property, if present.
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// Looks up a property.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.as_object().and_then(|props| props.get(key))
    }

    /// Borrows the underlying value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the object, returning the underlying value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Normalizes a panic payload caught inside an execution context.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "entry function panicked".to_string());
        Self::named("Panic", message)
    }
}

impl<E> From<E> for ErrorObject
where
    E: std::error::Error,
{
    fn from(err: E) -> Self {
        let mut obj = Self::new(err.to_string());
        if let Some(source) = err.source() {
            obj = obj.with_property("source", Value::String(source.to_string()));
        }
        obj
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => f.write_str(message),
            None => f.write_str(&display_value(&self.0)),
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
