//! Data model shared by the coordinator and execution contexts.

pub mod context;
pub mod protocol;
pub mod transfer;

pub use context::{ContextMap, ContextValue};
pub use protocol::{CorrelationId, Frame, Request, Response};
pub use transfer::{Completion, InputTransferSelector, OutputTransferSelector, TransferList};
