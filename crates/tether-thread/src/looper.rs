//! Looper and Handler
//!
//! A looper owns one thread that runs posted closures in order. Handlers are
//! cheap clonable posters bound to a looper.

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crate::queue::TaskQueue;
use crate::{run_task, Result, TaskFn, ThreadError};

/// Poster for a [`Looper`] thread
#[derive(Clone)]
pub struct Handler {
    queue: Arc<TaskQueue<TaskFn>>,
    thread: ThreadId,
    name: Arc<str>,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl Handler {
    /// Queue a closure on the looper thread. Returns false after the looper quit.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.queue.push(Box::new(task)).is_err() {
            tracing::debug!("looper {} has quit, task dropped", self.name);
            return false;
        }
        true
    }

    /// True when called from the looper's own thread
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Dedicated thread with a FIFO queue
pub struct Looper {
    handler: Handler,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Looper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Looper")
            .field("name", &self.handler.name)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Looper {
    /// Start a looper thread
    pub fn spawn(name: &str) -> Result<Self> {
        let queue: Arc<TaskQueue<TaskFn>> = Arc::new(TaskQueue::new());
        let worker_queue = Arc::clone(&queue);
        let lane = name.to_string();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(task) = worker_queue.wait_for_task() {
                    run_task(&lane, task);
                }
            })
            .map_err(|source| ThreadError::Spawn { name: name.to_string(), source })?;

        tracing::debug!("looper {} started", name);
        Ok(Self {
            handler: Handler {
                queue,
                thread: thread.thread().id(),
                name: Arc::from(name),
            },
            thread: Some(thread),
        })
    }

    pub fn handler(&self) -> Handler {
        self.handler.clone()
    }

    /// Stop accepting tasks, run what is queued, then join
    pub fn quit(&mut self) {
        self.handler.queue.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        self.quit();
    }
}
