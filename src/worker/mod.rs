//! Worker pool infrastructure for job execution.
//!
//! A pool owns a priority channel, bounds concurrent job bodies with a
//! counting permit, and supports one-shot and fixed-interval repeating
//! jobs. The engine runs two pools: one for interactions and a strictly
//! serial one (`max_concurrency = 1`) for maintenance.

mod pool;


pub use pool::{JobError, JobRunner, PoolConfig, WorkerPool};
