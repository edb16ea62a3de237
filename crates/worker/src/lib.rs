//! Batch replay of catalog changes through the readiness service.
//!
//! Reads `EventEnvelope<CatalogChange>` JSON lines, runs each through the
//! service in the configured execution mode, drives deferred work to a fixed
//! point and reports the readiness of every product the changes touched.

pub mod replay;

pub use replay::{ReplayReport, Replayer};
