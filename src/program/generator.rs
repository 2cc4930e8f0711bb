//! Turns an entry task, context bindings and imports into a [`Program`].
//!
//! Every check that can fail happens here, so a handle that builds
//! successfully never hits a representation problem at call time.

use serde_json::Number;

use super::{Binding, BindingValue, GeneratedProgram, Program};
use crate::error::SerializationError;
use crate::registry::registry;
use crate::types::{ContextMap, ContextValue};

/// Whether an import location must be resolved against the root path: it
/// has no scheme and no protocol-relative prefix.
///
/// ```
/// use offload::program::is_relative;
///
/// assert!(is_relative("/js/sum.js"));
/// assert!(is_relative("lib/sum.js"));
/// assert!(!is_relative("https://cdn.example/lodash.js"));
/// assert!(!is_relative("//cdn.example/lodash.js"));
/// ```
pub fn is_relative(location: &str) -> bool {
    !location.contains("://") && !location.starts_with("//")
}

/// Prefixes a relative location with the root path; absolute and remote
/// locations are returned untouched.
///
/// ```
/// use offload::program::resolve_import;
///
/// assert_eq!(
///     resolve_import("/js/sum.js", Some("http://localhost:9876")),
///     "http://localhost:9876/js/sum.js"
/// );
/// assert_eq!(
///     resolve_import("https://cdn.example/a.js", Some("http://localhost:9876")),
///     "https://cdn.example/a.js"
/// );
/// assert_eq!(resolve_import("/js/sum.js", None), "/js/sum.js");
/// ```
pub fn resolve_import(location: &str, root_path: Option<&str>) -> String {
    match root_path {
        Some(root) if is_relative(location) => {
            match (root.ends_with('/'), location.strip_prefix('/')) {
                (true, Some(rest)) => format!("{root}{rest}"),
                _ => format!("{root}{location}"),
            }
        }
        _ => location.to_string(),
    }
}

/// Generates the program for an entry task.
///
/// # Errors
///
/// Returns [`SerializationError`] when the entry task or output selector is
/// not registered, a binding name is not an identifier, or a binding value
/// has no representation (a non-finite float, an unregistered function, or
/// a value whose conversion failed).
pub fn generate(
    entry: &str,
    context: &ContextMap,
    imports: &[String],
    root_path: Option<&str>,
    output_transfer: Option<&str>,
    self_terminate: bool,
) -> Result<GeneratedProgram, SerializationError> {
    if !registry().has_task(entry) {
        return Err(SerializationError::new(
            entry,
            "no entry task is registered under this name",
        ));
    }

    if let Some(selector) = output_transfer {
        if !registry().has_output_transfer(selector) {
            return Err(SerializationError::new(
                selector,
                "no output-transfer selector is registered under this name",
            ));
        }
    }

    let imports = imports
        .iter()
        .map(|location| resolve_import(location, root_path))
        .collect();

    let context = context
        .iter()
        .map(|(name, value)| encode_binding(name, value))
        .collect::<Result<Vec<_>, _>>()?;

    let program = Program {
        imports,
        context,
        self_terminate,
        output_transfer: output_transfer.map(str::to_string),
        entry: entry.to_string(),
    };

    tracing::trace!(entry, self_terminate, "generated program");

    Ok(GeneratedProgram::new(program))
}

pub(crate) fn encode_binding(
    name: &str,
    value: &ContextValue,
) -> Result<Binding, SerializationError> {
    if !is_identifier(name) {
        return Err(SerializationError::new(
            name,
            "binding names must be identifiers",
        ));
    }

    let value = match value {
        ContextValue::Bool(b) => BindingValue::Boolean(*b),
        ContextValue::Int(i) => BindingValue::Number(Number::from(*i)),
        ContextValue::UInt(u) => BindingValue::Number(Number::from(*u)),
        ContextValue::Float(f) => BindingValue::Number(Number::from_f64(*f).ok_or_else(|| {
            SerializationError::new(name, format!("{f} is not a finite number"))
        })?),
        ContextValue::String(s) => BindingValue::String(s.clone()),
        ContextValue::Function(function) => {
            if !registry().has_function(function) {
                return Err(SerializationError::new(
                    name,
                    format!("function `{function}` is not registered"),
                ));
            }
            BindingValue::Function(function.clone())
        },
        ContextValue::Object(v) => BindingValue::Object(v.clone()),
        ContextValue::Unrepresentable(reason) => {
            return Err(SerializationError::new(name, reason.clone()));
        },
    };

    Ok(Binding {
        name: name.to_string(),
        value,
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {},
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
