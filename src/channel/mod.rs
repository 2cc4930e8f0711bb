//! Coordinator-side channels: correlated request/response calls over one
//! execution context's message link.
//!
//! Two distinct types share the envelope format but not their id policy:
//!
//! - [`OneShotChannel`] carries exactly one call under the fixed
//!   [`CorrelationId::ONE_SHOT`] id, against a self-terminating program.
//! - [`MultiplexChannel`] hands out increasing ids from
//!   [`CorrelationId::FIRST`] and matches any number of outstanding calls.

mod multiplex;
mod one_shot;

pub(crate) use multiplex::MultiplexChannel;
pub(crate) use one_shot::OneShotChannel;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{Completion, CorrelationId, Frame, Request, Response, TransferList};

/// Encodes a request for posting.
fn request_frame(id: CorrelationId, args: Vec<Value>, transfer: TransferList) -> Result<Frame> {
    Frame::encode(&Request { id, args }, transfer)
}

/// Turns a decoded response into what the caller sees.
fn settle(response: Response, transfer: TransferList) -> Result<Completion> {
    match response.into_result() {
        Ok(value) => Ok(Completion { value, transfer }),
        Err(error) => Err(Error::Execution(error)),
    }
}
