//! Generated programs.
//!
//! A [`Program`] is the single initialization message an execution context
//! boots from. Its fields are installed in declaration order: imports,
//! context bindings, the self-terminate flag, the output-transfer selector
//! slot, then the entry point. The message-dispatch routine is the
//! context's own event loop and needs no slot.

pub mod generator;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

pub use generator::{generate, is_relative, resolve_import};

/// One installed context binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Name the binding is reachable under inside the context.
    pub name: String,
    /// Encoded value.
    #[serde(flatten)]
    pub value: BindingValue,
}

/// Encoding of a binding's value, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BindingValue {
    /// Passed through verbatim.
    Boolean(bool),
    /// Passed through verbatim.
    Number(Number),
    /// Quoted.
    String(String),
    /// Name of a registered helper function.
    Function(String),
    /// Embedded JSON form.
    Object(Value),
}

/// Initialization message for an execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Import locations, already resolved against the root path.
    pub imports: Vec<String>,
    /// Bindings installed before the entry point, in order.
    pub context: Vec<Binding>,
    /// Whether the context exits after posting its single response.
    pub self_terminate: bool,
    /// Registered output-transfer selector, if any.
    pub output_transfer: Option<String>,
    /// Registered entry task.
    pub entry: String,
}

impl Program {
    /// Canonical text form. Identical programs render identically.
    pub fn render(&self) -> String {
        // Serializing plain owned data into a string cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// A program together with its rendered text, generated once and shared by
/// every handle forked from the same descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProgram {
    program: Program,
    text: String,
}

impl GeneratedProgram {
    pub(crate) fn new(program: Program) -> Self {
        let text = program.render();
        Self { program, text }
    }

    /// The structured program.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The rendered program text.
    pub fn text(&self) -> &str {
        &self.text
    }
}
