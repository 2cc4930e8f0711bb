use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{TaskDescriptor, TaskHandle};
use crate::channel::OneShotChannel;
use crate::error::{Error, Result};
use crate::host::ProgramLease;
use crate::program::GeneratedProgram;
use crate::types::Completion;

/// A handle that runs every call in a fresh execution context.
///
/// Each context exits on its own after answering, so [`kill`](TaskHandle::kill)
/// only revokes the program URL the contexts are created from.
#[derive(Debug)]
pub struct ExclusiveTask {
    descriptor: Arc<TaskDescriptor>,
    program: Arc<GeneratedProgram>,
    lease: ProgramLease,
    killed: AtomicBool,
}

impl ExclusiveTask {
    pub(crate) fn new(descriptor: TaskDescriptor) -> Result<Self> {
        let program = Arc::new(descriptor.generate(true)?);
        Ok(Self::from_parts(Arc::new(descriptor), program))
    }

    fn from_parts(descriptor: Arc<TaskDescriptor>, program: Arc<GeneratedProgram>) -> Self {
        let lease = ProgramLease::publish(program.clone());
        Self {
            descriptor,
            program,
            lease,
            killed: AtomicBool::new(false),
        }
    }

    /// The descriptor this handle was built from.
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    /// The generated program every call boots from.
    pub fn program(&self) -> &GeneratedProgram {
        &self.program
    }

    /// Whether [`kill`](TaskHandle::kill) has been called.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TaskHandle for ExclusiveTask {
    async fn run_with_transfer(&self, args: Vec<Value>) -> Result<Completion> {
        if self.is_killed() {
            return Err(Error::Killed);
        }
        let transfer = self.descriptor.select_transfer(&args);
        let channel = OneShotChannel::open(self.lease.url())?;
        channel.call(args, transfer).await
    }

    fn kill(&self) {
        if !self.killed.swap(true, Ordering::AcqRel) {
            tracing::debug!(entry = self.descriptor.entry(), "killed exclusive task");
        }
        self.lease.release();
    }

    fn fork(&self) -> Result<Self> {
        Ok(Self::from_parts(self.descriptor.clone(), self.program.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::registry;
    use crate::task::Task;
    use serde_json::json;

    #[tokio::test]
    async fn fork_shares_program_but_not_lease() {
        registry().register_task("exclusive-fork", |call| async move {
            Ok(json!(call.args().len()))
        });
        let task = Task::builder("exclusive-fork").exclusive().unwrap();
        let forked = task.fork().unwrap();

        assert!(Arc::ptr_eq(&task.program, &forked.program));
        assert_ne!(task.lease.url(), forked.lease.url());

        task.kill();
        assert!(matches!(task.run(vec![]).await, Err(Error::Killed)));
        assert_eq!(forked.run(vec![json!(1), json!(2)]).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn kill_is_idempotent() {
        registry().register_task("exclusive-kill", |_| async { Ok(json!(null)) });
        let task = Task::builder("exclusive-kill").exclusive().unwrap();
        task.kill();
        task.kill();
        assert!(task.is_killed());
        assert!(task.lease.is_released());
    }
}
