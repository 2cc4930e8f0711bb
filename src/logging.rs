//! Subscriber setup for binaries and tests that want to see the crate's
//! `tracing` events.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a formatting subscriber filtered by `RUST_LOG` (default
/// `info`). Does nothing if a global subscriber is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
