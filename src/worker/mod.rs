//! Code that runs inside an execution context.
//!
//! A context boots from a [`Program`](crate::program::Program): it resolves
//! imports and bindings into a [`Scope`], looks up the entry task, then
//! answers each request with exactly one response.

pub(crate) mod dispatch;
pub mod scope;

pub use scope::{Invocation, Scope};
