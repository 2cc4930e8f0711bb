//! Host facilities: program publication and execution-context lifecycle.

pub(crate) mod context;
pub mod programs;

pub(crate) use context::{ExecutionContext, MessageListener};
pub use programs::{programs, ProgramLease, ProgramStore, ProgramUrl};

/// The host's hint for how many contexts can run in parallel, when it can
/// tell.
pub fn available_parallelism() -> Option<usize> {
    std::thread::available_parallelism().ok().map(usize::from)
}
