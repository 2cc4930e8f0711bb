use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use super::{request_frame, settle};
use crate::error::{Error, Result};
use crate::host::{ExecutionContext, MessageListener, ProgramLease};
use crate::program::GeneratedProgram;
use crate::types::{Completion, CorrelationId, Frame, Response, TransferList};

/// Outstanding calls keyed by correlation id.
#[derive(Default)]
struct Pending {
    calls: DashMap<CorrelationId, oneshot::Sender<Result<Completion>>>,
    closed: AtomicBool,
}

impl Pending {
    fn fail_all(&self) {
        let ids: Vec<_> = self.calls.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.calls.remove(&id) {
                let _ = tx.send(Err(Error::Terminated));
            }
        }
    }
}

impl MessageListener for Pending {
    fn on_message(&self, frame: Frame) {
        let (response, transfer) = match frame.decode::<Response>() {
            Ok(decoded) => decoded,
            Err(error) => {
                tracing::warn!(error = %error, "dropping undecodable response");
                return;
            },
        };

        match self.calls.remove(&response.id) {
            Some((id, tx)) => {
                tracing::debug!(id = %id, is_error = response.is_error, "matched response");
                let _ = tx.send(settle(response, transfer));
            },
            None => tracing::warn!(id = %response.id, "response has no pending request"),
        }
    }

    fn on_exit(&self) {
        self.closed.store(true, Ordering::Release);
        self.fail_all();
    }
}

/// A channel over one long-lived context, carrying any number of
/// concurrent calls.
pub(crate) struct MultiplexChannel {
    context: ExecutionContext,
    lease: ProgramLease,
    pending: Arc<Pending>,
    next_id: AtomicI64,
}

impl MultiplexChannel {
    /// Publishes `program` under a URL owned by this channel and starts a
    /// context from it.
    pub(crate) fn open(program: Arc<GeneratedProgram>) -> Result<Self> {
        let lease = ProgramLease::publish(program);
        let pending = Arc::new(Pending::default());
        let context = ExecutionContext::spawn(lease.url(), pending.clone())?;
        Ok(Self {
            context,
            lease,
            pending,
            next_id: AtomicI64::new(CorrelationId::FIRST.0),
        })
    }

    /// Issues one call under the next correlation id.
    pub(crate) async fn request(&self, args: Vec<Value>, transfer: TransferList) -> Result<Completion> {
        let id = CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let frame = request_frame(id, args, transfer)?;

        let (tx, rx) = oneshot::channel();
        self.pending.calls.insert(id, tx);
        // the context may have exited between the insert and now
        if self.pending.closed.load(Ordering::Acquire) {
            self.pending.calls.remove(&id);
            return Err(Error::Terminated);
        }
        if let Err(error) = self.context.post_message(frame) {
            self.pending.calls.remove(&id);
            return Err(error);
        }
        tracing::debug!(context = self.context.id(), id = %id, "posted request");

        rx.await.unwrap_or(Err(Error::Terminated))
    }

    /// Number of calls awaiting a response.
    pub(crate) fn in_flight(&self) -> usize {
        self.pending.calls.len()
    }

    /// Terminates the context and revokes the program URL.
    pub(crate) fn dispose(&self) {
        self.context.terminate();
        self.lease.release();
    }
}

impl Drop for MultiplexChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}
