//! Addressable storage for generated programs.
//!
//! Contexts are created from a program URL, the way a host loads a script
//! from an object URL. Each published URL must be revoked exactly once;
//! [`ProgramLease`] owns one URL and guarantees that.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::program::GeneratedProgram;

/// Address of a published program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramUrl(String);

impl ProgramUrl {
    /// The URL as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide mapping from program URLs to generated programs.
#[derive(Debug, Default)]
pub struct ProgramStore {
    programs: DashMap<ProgramUrl, Arc<GeneratedProgram>>,
}

static STORE: LazyLock<ProgramStore> = LazyLock::new(ProgramStore::default);

/// The process-wide program store.
pub fn programs() -> &'static ProgramStore {
    &STORE
}

impl ProgramStore {
    /// Publishes a program under a fresh URL.
    pub fn publish(&self, program: Arc<GeneratedProgram>) -> ProgramUrl {
        let url = ProgramUrl(format!("program:{}", uuid::Uuid::new_v4()));
        self.programs.insert(url.clone(), program);
        url
    }

    /// Looks up a published program.
    pub fn resolve(&self, url: &ProgramUrl) -> Option<Arc<GeneratedProgram>> {
        self.programs.get(url).map(|entry| entry.value().clone())
    }

    /// Releases a URL. Returns whether it was still published.
    pub fn revoke(&self, url: &ProgramUrl) -> bool {
        self.programs.remove(url).is_some()
    }

    /// Number of published programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether no program is published.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Owns one published URL and revokes it exactly once, on
/// [`release`](ProgramLease::release) or drop.
#[derive(Debug)]
pub struct ProgramLease {
    url: ProgramUrl,
    released: AtomicBool,
}

impl ProgramLease {
    /// Publishes `program` and takes ownership of its URL.
    pub fn publish(program: Arc<GeneratedProgram>) -> Self {
        Self {
            url: programs().publish(program),
            released: AtomicBool::new(false),
        }
    }

    /// The leased URL. Must not be used to create contexts after release.
    pub fn url(&self) -> &ProgramUrl {
        &self.url
    }

    /// Whether the URL has been revoked.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Revokes the URL. Later calls are no-ops.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            programs().revoke(&self.url);
            tracing::debug!(url = %self.url, "revoked program url");
        }
    }
}

impl Drop for ProgramLease {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;

    fn sample() -> Arc<GeneratedProgram> {
        Arc::new(GeneratedProgram::new(Program {
            imports: Vec::new(),
            context: Vec::new(),
            self_terminate: false,
            output_transfer: None,
            entry: "programs-sample".to_string(),
        }))
    }

    #[test]
    fn lease_revokes_exactly_once() {
        let lease = ProgramLease::publish(sample());
        let url = lease.url().clone();
        assert!(programs().resolve(&url).is_some());

        lease.release();
        assert!(lease.is_released());
        assert!(programs().resolve(&url).is_none());

        // second release must not touch the store again
        lease.release();
        assert!(!programs().revoke(&url));
    }

    #[test]
    fn dropping_a_lease_revokes_it() {
        let url = {
            let lease = ProgramLease::publish(sample());
            lease.url().clone()
        };
        assert!(programs().resolve(&url).is_none());
    }

    #[test]
    fn each_publish_gets_a_distinct_url() {
        let program = sample();
        let a = ProgramLease::publish(program.clone());
        let b = ProgramLease::publish(program);
        assert_ne!(a.url(), b.url());
        assert!(a.url().as_str().starts_with("program:"));
    }
}
