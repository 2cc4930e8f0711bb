//! Message envelopes exchanged over a channel.
//!
//! Requests encode as `[correlationId, [args...]]` and responses as
//! `[correlationId, payload, isError]`. Envelopes are encoded into a
//! [`Frame`] when posted and decoded on receipt, so argument and result
//! values are copied across the boundary. A frame's transfer list is moved
//! without being encoded.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ErrorObject, Result};
use crate::types::transfer::TransferList;

/// Matches a response to its request within one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub i64);

impl CorrelationId {
    /// The fixed id used by one-shot channels, which carry exactly one
    /// request/response pair.
    pub const ONE_SHOT: Self = Self(-1);

    /// First id handed out by a multiplexed channel.
    pub const FIRST: Self = Self(0);
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A call posted to an execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id the response must echo.
    pub id: CorrelationId,
    /// Positional arguments for the entry function.
    pub args: Vec<Value>,
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.id, &self.args).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Request {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (id, args) = <(CorrelationId, Vec<Value>)>::deserialize(deserializer)?;
        Ok(Self { id, args })
    }
}

/// An answer posted back by an execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Echo of the request's correlation id.
    pub id: CorrelationId,
    /// The result, or the normalized error when `is_error` is set.
    pub payload: Value,
    /// Whether `payload` describes a failure.
    pub is_error: bool,
}

impl Response {
    /// A successful response.
    pub fn ok(id: CorrelationId, payload: Value) -> Self {
        Self {
            id,
            payload,
            is_error: false,
        }
    }

    /// A failed response carrying a normalized error.
    pub fn error(id: CorrelationId, error: ErrorObject) -> Self {
        Self {
            id,
            payload: error.into_value(),
            is_error: true,
        }
    }

    /// Splits the response into the caller-visible outcome.
    pub fn into_result(self) -> std::result::Result<Value, ErrorObject> {
        if self.is_error {
            Err(ErrorObject::from_value(self.payload))
        } else {
            Ok(self.payload)
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.id, &self.payload, self.is_error).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (id, payload, is_error) = <(CorrelationId, Value, bool)>::deserialize(deserializer)?;
        Ok(Self {
            id,
            payload,
            is_error,
        })
    }
}

/// An encoded envelope plus the buffers moved with it.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// The JSON-encoded envelope.
    pub data: Vec<u8>,
    /// Buffers moved alongside, never encoded.
    pub transfer: TransferList,
}

impl Frame {
    /// Encodes an envelope.
    pub fn encode<T: Serialize>(envelope: &T, transfer: TransferList) -> Result<Self> {
        Ok(Self {
            data: serde_json::to_vec(envelope)?,
            transfer,
        })
    }

    /// Decodes the envelope, handing back the transfer list.
    pub fn decode<T: for<'de> Deserialize<'de>>(self) -> Result<(T, TransferList)> {
        let envelope = serde_json::from_slice(&self.data)?;
        Ok((envelope, self.transfer))
    }
}
