//! The binding scope an entry task sees, and the invocation handed to it.

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::ErrorObject;
use crate::program::generator::encode_binding;
use crate::program::{Binding, BindingValue, Program};
use crate::registry::{registry, HelperFn};
use crate::types::TransferList;

enum Entry {
    Data(Value),
    Function { name: String, function: HelperFn },
}

/// Bindings installed in an execution context: everything the imports
/// provide, overlaid with the program's context bindings.
#[derive(Default)]
pub struct Scope {
    bindings: IndexMap<String, Entry>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.bindings.keys()).finish()
    }
}

impl Scope {
    /// Installs imports, then context bindings, in program order.
    pub(crate) fn install(program: &Program) -> Result<Self, ErrorObject> {
        let mut scope = Self::default();

        for location in &program.imports {
            let module = registry().module(location).ok_or_else(|| {
                ErrorObject::named("StartupError", format!("failed to import `{location}`"))
            })?;
            for (name, value) in module.iter() {
                let binding = encode_binding(name, value).map_err(|err| {
                    ErrorObject::named("StartupError", format!("`{location}`: {err}"))
                })?;
                scope.bind(binding)?;
            }
        }

        for binding in &program.context {
            scope.bind(binding.clone())?;
        }

        Ok(scope)
    }

    fn bind(&mut self, binding: Binding) -> Result<(), ErrorObject> {
        let entry = match binding.value {
            BindingValue::Boolean(b) => Entry::Data(Value::Bool(b)),
            BindingValue::Number(n) => Entry::Data(Value::Number(n)),
            BindingValue::String(s) => Entry::Data(Value::String(s)),
            BindingValue::Object(v) => Entry::Data(v),
            BindingValue::Function(name) => {
                let function = registry().function(&name).ok_or_else(|| {
                    ErrorObject::named(
                        "StartupError",
                        format!("function `{name}` is no longer registered"),
                    )
                })?;
                Entry::Function { name, function }
            },
        };
        self.bindings.insert(binding.name, entry);
        Ok(())
    }

    /// A data binding's value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.bindings.get(name) {
            Some(Entry::Data(value)) => Some(value),
            _ => None,
        }
    }

    /// Whether any binding, data or function, exists under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Calls a function binding.
    ///
    /// # Errors
    ///
    /// A `TypeError` object when `name` is not bound to a function,
    /// otherwise whatever the function returns.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ErrorObject> {
        match self.bindings.get(name) {
            Some(Entry::Function { function, .. }) => function(args),
            _ => Err(ErrorObject::named(
                "TypeError",
                format!("`{name}` is not a function"),
            )),
        }
    }

    /// All bindings as one object. Functions appear as their registered
    /// name under a `function` key.
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .bindings
            .iter()
            .map(|(key, entry)| {
                let value = match entry {
                    Entry::Data(value) => value.clone(),
                    Entry::Function { name, .. } => {
                        serde_json::json!({ "function": name })
                    },
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

/// One call delivered to an entry task.
#[derive(Debug)]
pub struct Invocation {
    args: Vec<Value>,
    transfer: TransferList,
    scope: Arc<Scope>,
}

impl Invocation {
    pub(crate) fn new(args: Vec<Value>, transfer: TransferList, scope: Arc<Scope>) -> Self {
        Self {
            args,
            transfer,
            scope,
        }
    }

    /// Positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// One positional argument.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Consumes the invocation, returning its arguments.
    pub fn into_args(self) -> Vec<Value> {
        self.args
    }

    /// Buffers moved in with the call.
    pub fn transfer(&self) -> &[Bytes] {
        &self.transfer
    }

    /// Takes ownership of the moved buffers.
    pub fn take_transfer(&mut self) -> TransferList {
        std::mem::take(&mut self.transfer)
    }

    /// The context's bindings.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Shorthand for [`Scope::get`].
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    /// Shorthand for [`Scope::call`].
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ErrorObject> {
        self.scope.call(name, args)
    }
}
