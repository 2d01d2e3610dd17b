//! Bounded task pool
//!
//! A fixed set of named worker threads drains one shared bounded queue.
//! Producers block (or await, from async code) while the queue is full, so
//! work is never dropped. Each task runs isolated: an error or a panic is
//! logged and reported through the task's [`TaskHandle`] and the worker moves
//! on to the next task.
//!
//! ```rust,ignore
//! use beacon_pool::{PoolConfig, Task, TaskPool};
//!
//! let pool = TaskPool::open(PoolConfig::with_workers(4))?;
//! let handle = pool.submit(Task::new("store-reading", move || {
//!     store.insert("readings", &mut reading)?;
//!     Ok(())
//! }))?;
//! handle.wait()?;
//! pool.close();
//! ```

mod config;
mod error;
mod pool;
mod task;

pub use config::PoolConfig;
pub use error::{PoolError, PoolResult, TaskError};
pub use pool::{PoolStats, TaskPool};
pub use task::{Task, TaskHandle, TaskOutcome};
