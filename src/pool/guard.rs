use std::ops::Deref;
use std::sync::Arc;

use super::PoolInner;
use crate::task::SharedTask;

/// An acquired pool member. Dropping the guard releases the member.
pub struct PoolGuard {
    pool: Arc<PoolInner>,
    member: usize,
}

impl PoolGuard {
    pub(super) fn new(pool: Arc<PoolInner>, member: usize) -> Self {
        Self { pool, member }
    }

    /// Position of the member within the pool.
    pub fn index(&self) -> usize {
        self.member
    }
}

impl Deref for PoolGuard {
    type Target = SharedTask;

    fn deref(&self) -> &SharedTask {
        self.pool.member(self.member)
    }
}

impl std::fmt::Debug for PoolGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("member", &self.member)
            .finish()
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.pool.release(self.member);
    }
}
