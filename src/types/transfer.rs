//! Transfer lists: binary buffers that move across the context boundary
//! instead of being copied through the encoded frame.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

/// Buffers nominated to move alongside a message.
pub type TransferList = Vec<Bytes>;

/// Picks the buffers to transfer from a call's arguments. Runs on the
/// caller's side before the request is posted.
pub type InputTransferSelector = Arc<dyn Fn(&[Value]) -> TransferList + Send + Sync>;

/// Picks the buffers to transfer from a result. Runs inside the execution
/// context, so it is registered by name like an entry task.
pub type OutputTransferSelector = Arc<dyn Fn(&Value) -> TransferList + Send + Sync>;

/// A resolved call: the result value plus any buffers the output selector
/// nominated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// The entry function's result.
    pub value: Value,
    /// Buffers moved back with the result.
    pub transfer: TransferList,
}

impl Completion {
    /// A completion with no transferred buffers.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            transfer: Vec::new(),
        }
    }
}
