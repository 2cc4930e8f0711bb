//! Execution contexts: one OS thread per context, each with its own
//! single-threaded runtime and no memory shared with the coordinator
//! beyond the frames posted to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::programs::{programs, ProgramUrl};
use crate::error::{Error, Result};
use crate::types::Frame;
use crate::worker::dispatch::event_loop;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(0);

/// Receives what an execution context posts back.
///
/// Both callbacks run on the context's own thread.
pub(crate) trait MessageListener: Send + Sync + 'static {
    /// A response frame was posted.
    fn on_message(&self, frame: Frame);

    /// The context has stopped; nothing more will be posted.
    fn on_exit(&self);
}

/// Coordinator-side handle to a running execution context. Dropping it
/// terminates the context.
#[derive(Debug)]
pub(crate) struct ExecutionContext {
    id: u64,
    inbound: mpsc::UnboundedSender<Frame>,
    shutdown: CancellationToken,
}

impl ExecutionContext {
    /// Creates a context that boots from the program published at `url`.
    /// A revoked URL still yields a running context; it answers every
    /// request with a startup error.
    pub(crate) fn spawn(url: &ProgramUrl, listener: Arc<dyn MessageListener>) -> Result<Self> {
        let id = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        let program = programs().resolve(url);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(Error::Spawn)?;

        let (inbound, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        thread::Builder::new()
            .name(format!("offload-context-{id}"))
            .spawn(move || {
                runtime.block_on(event_loop(id, program, receiver, listener.clone(), token));
                // in-flight calls are cancelled with the runtime
                drop(runtime);
                listener.on_exit();
                tracing::debug!(context = id, "execution context exited");
            })
            .map_err(Error::Spawn)?;

        tracing::debug!(context = id, url = %url, "spawned execution context");

        Ok(Self {
            id,
            inbound,
            shutdown,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Posts a frame to the context.
    pub(crate) fn post_message(&self, frame: Frame) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Terminated);
        }
        self.inbound.send(frame).map_err(|_| Error::Terminated)
    }

    /// Stops the context immediately. Idempotent.
    pub(crate) fn terminate(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::debug!(context = self.id, "terminating execution context");
            self.shutdown.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.terminate();
    }
}
