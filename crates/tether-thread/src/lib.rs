//! tether threading
//!
//! Execution lanes used by async bindings:
//! - [`TaskQueue`]: FIFO queue with a condition variable, shared by every lane
//! - [`ThreadPool`]: fixed set of workers draining one queue
//! - [`Looper`] / [`Handler`]: one dedicated thread and its poster
//! - [`NamedThreadPool`]: lazily created, self-expiring workers keyed by name

mod queue;
mod pool;
mod looper;
mod named;

pub use queue::TaskQueue;
pub use pool::ThreadPool;
pub use looper::{Handler, Looper};
pub use named::{
    post_on_named_thread, NamedThreadOptions, NamedThreadPool, DEFAULT_KEEP_ALIVE_MS,
    MAX_KEEP_ALIVE_MS,
};

/// Boxed unit of work
pub type TaskFn = Box<dyn FnOnce() + Send + 'static>;

/// Threading errors
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("queue is closed")]
    Closed,
}

/// Threading result
pub type Result<T> = std::result::Result<T, ThreadError>;

/// Run a task, logging instead of unwinding through the worker loop
pub(crate) fn run_task(lane: &str, task: TaskFn) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
        tracing::error!("task panicked on {}", lane);
    }
}
