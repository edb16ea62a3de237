//! Process-wide tracing setup shared by the worker binary and tests.

/// Initialize tracing with the defaults (`info`, JSON lines).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}

pub mod tracing;

pub use tracing::{LogFormat, ParseLogFormatError, init_with};
