//! Development-time tracing for the hunter.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted.
//!
//! - **Audit log (`io/audit_log`)**: JSONL record of every portal write
//!   attempt, written when `--audit-log` is given and unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset: cycle outcomes and warnings only.
const DEFAULT_FILTER: &str = "hunter=info";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to [`DEFAULT_FILTER`] if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=hunter=debug hunter run --dry-run
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
