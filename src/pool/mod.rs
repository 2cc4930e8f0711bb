//! A bounded set of shared handles with queued, timed acquisition.
//!
//! Members are created eagerly and are either idle or busy. An acquisition
//! takes the oldest idle member or queues. A released member goes straight
//! to the longest-waiting queued acquisition, FIFO, and only becomes idle
//! when nobody is waiting. A queued acquisition that outlives the
//! configured timeout is removed from the queue and fails with
//! [`Error::AcquisitionTimeout`].
//!
//! # Examples
//!
//! ```
//! use offload::{registry, PoolConfig, Task, TaskHandle};
//! use serde_json::{json, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> offload::Result<()> {
//! registry().register_task("docs-pool-double", |call| async move {
//!     Ok(json!(call.arg(0).and_then(Value::as_i64).unwrap_or(0) * 2))
//! });
//!
//! let pool = Task::builder("docs-pool-double").pool(PoolConfig::default().with_size(2))?;
//! assert_eq!(pool.size(), 2);
//! assert_eq!(pool.run(vec![json!(21)]).await?, json!(42));
//! assert_eq!(pool.idle_count(), 2);
//! pool.kill();
//! # Ok(())
//! # }
//! ```

mod guard;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

pub use guard::PoolGuard;

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::program::GeneratedProgram;
use crate::task::{SharedTask, TaskDescriptor, TaskHandle};
use crate::types::Completion;

type Handoff = oneshot::Sender<Result<usize>>;

/// A queued acquisition.
struct Waiter {
    id: u64,
    tx: Handoff,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<usize>,
    waiters: VecDeque<Waiter>,
    killed: bool,
}

pub(crate) struct PoolInner {
    descriptor: Arc<TaskDescriptor>,
    program: Arc<GeneratedProgram>,
    config: PoolConfig,
    members: Vec<SharedTask>,
    state: Mutex<PoolState>,
    next_waiter: AtomicU64,
}

impl PoolInner {
    pub(crate) fn member(&self, index: usize) -> &SharedTask {
        &self.members[index]
    }

    /// Returns a member, handing it to the oldest live waiter if any.
    pub(crate) fn release(&self, member: usize) {
        let mut state = self.state.lock();
        if state.killed {
            return;
        }
        // hand off under the lock so a timed-out waiter can tell it was served
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.tx.send(Ok(member)).is_ok() {
                tracing::debug!(member, waiter = waiter.id, "handed member to waiter");
                return;
            }
        }
        tracing::debug!(member, "member idle");
        state.idle.push_back(member);
    }

    /// Removes a waiter from the queue. Returns false when it was already
    /// served or rejected.
    fn dequeue(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        match state.waiters.iter().position(|waiter| waiter.id == id) {
            Some(position) => {
                state.waiters.remove(position);
                true
            },
            None => false,
        }
    }
}

/// An acquisition sitting in the waiter queue. Dropping it unqueues it and
/// returns any member that was handed over in the meantime.
struct Queued {
    pool: Arc<PoolInner>,
    id: u64,
    rx: Option<oneshot::Receiver<Result<usize>>>,
}

impl Queued {
    async fn wait(mut self, timeout: Duration) -> Result<usize> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(Error::PoolKilled);
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(outcome) => {
                self.rx = None;
                outcome.unwrap_or(Err(Error::PoolKilled))
            },
            Err(_) if self.pool.dequeue(self.id) => {
                self.rx = None;
                tracing::warn!(
                    waiter = self.id,
                    ?timeout,
                    "pool acquisition timed out"
                );
                Err(Error::AcquisitionTimeout { timeout })
            },
            Err(_) => {
                // served between the timer firing and the dequeue
                let outcome = self.rx.take().map(|mut rx| rx.try_recv());
                match outcome {
                    Some(Ok(handoff)) => handoff,
                    _ => Err(Error::PoolKilled),
                }
            },
        }
    }
}

impl Drop for Queued {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            self.pool.dequeue(self.id);
            if let Ok(Ok(member)) = rx.try_recv() {
                self.pool.release(member);
            }
        }
    }
}

/// A bounded pool of [`SharedTask`] members.
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("entry", &self.inner.descriptor.entry())
            .field("size", &self.size())
            .field("idle", &self.idle_count())
            .field("waiting", &self.waiting_count())
            .finish()
    }
}

impl Pool {
    /// Generates the program once and starts every member from it.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] for an unrepresentable descriptor and
    /// [`Error::Spawn`] when a member's context cannot start.
    pub fn new(descriptor: TaskDescriptor, config: PoolConfig) -> Result<Self> {
        let program = Arc::new(descriptor.generate(false)?);
        Self::from_parts(Arc::new(descriptor), program, config)
    }

    fn from_parts(
        descriptor: Arc<TaskDescriptor>,
        program: Arc<GeneratedProgram>,
        config: PoolConfig,
    ) -> Result<Self> {
        let size = config.effective_size();
        let members = (0..size)
            .map(|_| SharedTask::from_parts(descriptor.clone(), program.clone()))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            entry = descriptor.entry(),
            size,
            acquire_timeout_ms = config.acquire_timeout_ms,
            "created pool"
        );

        let state = PoolState {
            idle: (0..size).collect(),
            ..PoolState::default()
        };
        Ok(Self {
            inner: Arc::new(PoolInner {
                descriptor,
                program,
                config,
                members,
                state: Mutex::new(state),
                next_waiter: AtomicU64::new(0),
            }),
        })
    }

    /// Takes a member, waiting in line when all are busy.
    ///
    /// # Errors
    ///
    /// [`Error::AcquisitionTimeout`] when no member frees up in time, and
    /// [`Error::PoolKilled`] when the pool is killed before or while
    /// waiting.
    pub async fn acquire(&self) -> Result<PoolGuard> {
        let queued = {
            let mut state = self.inner.state.lock();
            if state.killed {
                return Err(Error::PoolKilled);
            }
            if let Some(member) = state.idle.pop_front() {
                tracing::debug!(member, "acquired idle member");
                return Ok(PoolGuard::new(self.inner.clone(), member));
            }

            let id = self.inner.next_waiter.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { id, tx });
            tracing::debug!(waiter = id, queued = state.waiters.len(), "waiting for a member");
            Queued {
                pool: self.inner.clone(),
                id,
                rx: Some(rx),
            }
        };

        let member = queued.wait(self.inner.config.acquire_timeout()).await?;
        Ok(PoolGuard::new(self.inner.clone(), member))
    }

    /// Returns a member early. Equivalent to dropping the guard.
    pub fn release(&self, guard: PoolGuard) {
        drop(guard);
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.inner.members.len()
    }

    /// Members not currently acquired.
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Acquisitions queued for a member.
    pub fn waiting_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Whether [`kill`](TaskHandle::kill) has been called.
    pub fn is_killed(&self) -> bool {
        self.inner.state.lock().killed
    }

    /// The configuration the pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

#[async_trait]
impl TaskHandle for Pool {
    /// Acquires a member, runs on it and returns it on every exit path.
    async fn run_with_transfer(&self, args: Vec<Value>) -> Result<Completion> {
        let member = self.acquire().await?;
        member.run_with_transfer(args).await
    }

    /// Terminates every member, idle or busy, and rejects queued
    /// acquisitions with [`Error::PoolKilled`].
    fn kill(&self) {
        let waiters = {
            let mut state = self.inner.state.lock();
            if state.killed {
                return;
            }
            state.killed = true;
            state.idle.clear();
            std::mem::take(&mut state.waiters)
        };

        tracing::debug!(
            entry = self.inner.descriptor.entry(),
            rejected = waiters.len(),
            "killing pool"
        );
        for waiter in waiters {
            let _ = waiter.tx.send(Err(Error::PoolKilled));
        }
        for member in &self.inner.members {
            member.kill();
        }
    }

    fn fork(&self) -> Result<Self> {
        Self::from_parts(
            self.inner.descriptor.clone(),
            self.inner.program.clone(),
            self.inner.config.clone(),
        )
    }
}
