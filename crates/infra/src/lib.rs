//! Infrastructure around the inspection engine: the job queue that runs
//! deferred tasks, bus workers, configuration and runtime wiring.

pub mod config;
pub mod jobs;
pub mod runtime;
pub mod task_queue;
pub mod workers;

pub use config::{ConfigError, ReadinessConfig};
pub use runtime::ReadinessRuntime;
pub use task_queue::{JobTaskQueue, register_inspection_handlers};
