use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use super::{request_frame, settle};
use crate::error::{Error, Result};
use crate::host::{ExecutionContext, MessageListener, ProgramUrl};
use crate::types::{Completion, CorrelationId, Frame, Response, TransferList};

type Slot = Mutex<Option<oneshot::Sender<Result<Completion>>>>;

/// Settles the single pending call exactly once.
struct OneShotListener {
    slot: Slot,
}

impl OneShotListener {
    fn settle(&self, outcome: Result<Completion>) {
        if let Some(tx) = self.slot.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

impl MessageListener for OneShotListener {
    fn on_message(&self, frame: Frame) {
        let outcome = frame
            .decode::<Response>()
            .and_then(|(response, transfer)| {
                if response.id == CorrelationId::ONE_SHOT {
                    settle(response, transfer)
                } else {
                    Err(Error::Protocol(format!(
                        "one-shot channel received response for id {}",
                        response.id
                    )))
                }
            });
        self.settle(outcome);
    }

    fn on_exit(&self) {
        self.settle(Err(Error::Terminated));
    }
}

/// A channel that carries one call and is consumed by it.
pub(crate) struct OneShotChannel {
    context: ExecutionContext,
    response: oneshot::Receiver<Result<Completion>>,
}

impl OneShotChannel {
    /// Creates a fresh context from a self-terminating program.
    pub(crate) fn open(url: &ProgramUrl) -> Result<Self> {
        let (tx, response) = oneshot::channel();
        let listener = Arc::new(OneShotListener {
            slot: Mutex::new(Some(tx)),
        });
        let context = ExecutionContext::spawn(url, listener)?;
        Ok(Self { context, response })
    }

    /// Posts the call and waits for its response. The context is gone
    /// once this returns.
    pub(crate) async fn call(self, args: Vec<Value>, transfer: TransferList) -> Result<Completion> {
        let Self { context, response } = self;
        context.post_message(request_frame(CorrelationId::ONE_SHOT, args, transfer)?)?;
        tracing::debug!(context = context.id(), "posted one-shot request");

        let outcome = response.await.unwrap_or(Err(Error::Terminated));
        context.terminate();
        outcome
    }
}
