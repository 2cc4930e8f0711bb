use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{TaskDescriptor, TaskHandle};
use crate::channel::MultiplexChannel;
use crate::error::{Error, Result};
use crate::program::GeneratedProgram;
use crate::types::Completion;

/// A handle over one long-lived execution context.
///
/// The context starts when the handle is built. Calls may be issued
/// concurrently and complete in whatever order the context finishes them;
/// each resolves with its own result.
pub struct SharedTask {
    descriptor: Arc<TaskDescriptor>,
    program: Arc<GeneratedProgram>,
    channel: MultiplexChannel,
    killed: AtomicBool,
}

impl std::fmt::Debug for SharedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTask")
            .field("entry", &self.descriptor.entry())
            .field("in_flight", &self.channel.in_flight())
            .field("killed", &self.is_killed())
            .finish()
    }
}

impl SharedTask {
    pub(crate) fn new(descriptor: TaskDescriptor) -> Result<Self> {
        let program = Arc::new(descriptor.generate(false)?);
        Self::from_parts(Arc::new(descriptor), program)
    }

    pub(crate) fn from_parts(
        descriptor: Arc<TaskDescriptor>,
        program: Arc<GeneratedProgram>,
    ) -> Result<Self> {
        let channel = MultiplexChannel::open(program.clone())?;
        Ok(Self {
            descriptor,
            program,
            channel,
            killed: AtomicBool::new(false),
        })
    }

    /// The descriptor this handle was built from.
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    /// The generated program the context booted from.
    pub fn program(&self) -> &GeneratedProgram {
        &self.program
    }

    /// Calls still waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.channel.in_flight()
    }

    /// Whether [`kill`](TaskHandle::kill) has been called.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TaskHandle for SharedTask {
    async fn run_with_transfer(&self, args: Vec<Value>) -> Result<Completion> {
        if self.is_killed() {
            return Err(Error::Killed);
        }
        let transfer = self.descriptor.select_transfer(&args);
        self.channel.request(args, transfer).await
    }

    /// Terminates the context. Calls still in flight reject with
    /// [`Error::Terminated`].
    fn kill(&self) {
        if !self.killed.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                entry = self.descriptor.entry(),
                in_flight = self.in_flight(),
                "killed shared task"
            );
        }
        self.channel.dispose();
    }

    fn fork(&self) -> Result<Self> {
        Self::from_parts(self.descriptor.clone(), self.program.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::registry;
    use crate::task::Task;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn kill_rejects_in_flight_and_later_calls() {
        registry().register_task("shared-hang", |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(json!(null))
        });
        let task = Arc::new(Task::builder("shared-hang").shared().unwrap());

        let call = tokio::spawn({
            let task = task.clone();
            async move { task.run(vec![]).await }
        });
        while task.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        task.kill();
        task.kill();

        let outcome = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, Err(Error::Terminated)));
        assert!(matches!(task.run(vec![]).await, Err(Error::Killed)));
    }

    #[tokio::test]
    async fn fork_owns_its_own_context() {
        registry().register_task("shared-fork", |call| async move {
            Ok(call.arg(0).cloned().unwrap_or_default())
        });
        let task = Task::builder("shared-fork").shared().unwrap();
        let forked = task.fork().unwrap();
        assert!(Arc::ptr_eq(&task.program, &forked.program));

        task.kill();
        assert_eq!(forked.run(vec![json!("still here")]).await.unwrap(), json!("still here"));
    }
}
