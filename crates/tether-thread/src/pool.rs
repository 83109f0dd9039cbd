//! Thread Pool
//!
//! Fixed set of named workers draining one shared [`TaskQueue`]. Tasks run
//! in submission order across the pool but may overlap with each other.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::queue::TaskQueue;
use crate::{run_task, Result, TaskFn, ThreadError};

/// Thread pool
pub struct ThreadPool {
    name: String,
    workers: Vec<Worker>,
    queue: Arc<TaskQueue<TaskFn>>,
    active_tasks: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("active_tasks", &self.active_tasks.load(Ordering::Relaxed))
            .finish()
    }
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Worker {
    fn spawn(
        pool: &str,
        id: usize,
        queue: Arc<TaskQueue<TaskFn>>,
        active_tasks: Arc<AtomicUsize>,
    ) -> Result<Self> {
        let name = format!("{pool}-{id}");
        let lane = name.clone();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(task) = queue.wait_for_task() {
                    active_tasks.fetch_add(1, Ordering::SeqCst);
                    run_task(&lane, task);
                    active_tasks.fetch_sub(1, Ordering::SeqCst);
                }
                tracing::trace!("pool worker {} exiting", lane);
            })
            .map_err(|source| ThreadError::Spawn { name, source })?;

        Ok(Self { id, thread: Some(thread) })
    }
}

impl ThreadPool {
    /// Create a pool of `worker_count` threads named `<name>-<index>`
    pub fn new(name: &str, worker_count: usize) -> Result<Self> {
        let queue = Arc::new(TaskQueue::new());
        let active_tasks = Arc::new(AtomicUsize::new(0));

        let workers = (0..worker_count.max(1))
            .map(|id| Worker::spawn(name, id, Arc::clone(&queue), Arc::clone(&active_tasks)))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("thread pool {} started with {} workers", name, workers.len());
        Ok(Self {
            name: name.to_string(),
            workers,
            queue,
            active_tasks,
        })
    }

    /// Create with one worker per available CPU
    pub fn default_size(name: &str) -> Result<Self> {
        let count = thread::available_parallelism().map(|p| p.get()).unwrap_or(4);
        Self::new(name, count)
    }

    /// Submit a task. Returns false once the pool is shut down.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.queue.push(Box::new(task)).is_err() {
            tracing::warn!("thread pool {} is shut down, task dropped", self.name);
            return false;
        }
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending_tasks() == 0 && self.active_tasks() == 0
    }

    /// Let workers finish queued tasks, then join them
    pub fn shutdown(&mut self) {
        self.queue.close();
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_thread_pool() {
        let mut pool = ThreadPool::new("test-pool", 2).unwrap();
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            assert!(pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // shutdown drains the queue before joining
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(!pool.submit(|| {}));
    }

    #[test]
    fn test_worker_names() {
        let mut pool = ThreadPool::new("named-pool", 1).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        pool.submit(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        });
        assert_eq!(rx.recv().unwrap().as_deref(), Some("named-pool-0"));
        pool.shutdown();
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let mut pool = ThreadPool::new("panic-pool", 1).unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        pool.submit(|| panic!("boom"));
        let c = Arc::clone(&counter);
        pool.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
