//! Reindex pipeline.
//!
//! - `PipelineDriver`: pages through the store and owns the run lifecycle
//! - `ParallelBatchScheduler`: runs the batches of a page concurrently
//! - `BatchProjector`: enriches one batch and writes it as one bulk request
//! - `ConnectionSupervisor`: connect, staleness and reconnect handling
//! - `Shutdown`: stop signal that also interrupts every wait

pub mod circuit_breaker;
pub mod connection;
pub mod driver;
pub mod progress;
pub mod projector;
pub mod retry;
pub mod scheduler;
pub mod shutdown;

pub use connection::{ConnectionState, ConnectionSupervisor};
pub use driver::{DriverState, PipelineDriver};
pub use progress::{
    LogProgressSink, NullProgressSink, ProgressMetrics, ProgressSink, RunSummary, pacing_delay,
};
pub use projector::{BatchProjector, BatchResult};
pub use retry::{ErrorClass, RetryPolicy};
pub use scheduler::ParallelBatchScheduler;
pub use shutdown::Shutdown;
