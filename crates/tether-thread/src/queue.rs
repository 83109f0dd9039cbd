//! Task Queue
//!
//! FIFO queue guarded by a mutex, with a condition variable for waiting
//! consumers and a one-way close flag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Multi-producer FIFO queue
pub struct TaskQueue<T> {
    tasks: Mutex<VecDeque<T>>,
    condvar: Condvar,
    closed: AtomicBool,
}

impl<T> std::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task. Hands the task back when the queue is closed.
    pub fn push(&self, task: T) -> Result<(), T> {
        let mut queue = self.lock();
        if self.is_closed() {
            return Err(task);
        }
        queue.push_back(task);
        self.condvar.notify_one();
        Ok(())
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Remove every queued task in FIFO order
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    /// Block until a task is available or the queue is closed
    pub fn wait_for_task(&self) -> Option<T> {
        let mut queue = self.lock();
        loop {
            if let Some(task) = queue.pop_front() {
                return Some(task);
            }
            if self.is_closed() {
                return None;
            }
            queue = self.condvar.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block up to `timeout` for a task
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.lock();
        loop {
            if let Some(task) = queue.pop_front() {
                return Some(task);
            }
            let now = Instant::now();
            if self.is_closed() || now >= deadline {
                return None;
            }
            queue = self
                .condvar
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Close the queue and wake every waiter. Queued tasks stay poppable.
    pub fn close(&self) {
        let _queue = self.lock();
        self.closed.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let q = TaskQueue::new();
        for i in 0..5 {
            q.push(i).unwrap();
        }
        assert_eq!(q.drain(), vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_push_after_close_is_rejected() {
        let q = TaskQueue::new();
        q.push(1).unwrap();
        q.close();
        assert_eq!(q.push(2), Err(2));
        assert_eq!(q.wait_for_task(), Some(1));
        assert_eq!(q.wait_for_task(), None);
    }

    #[test]
    fn test_wait_timeout_expires() {
        let q: TaskQueue<u8> = TaskQueue::new();
        let start = Instant::now();
        assert_eq!(q.wait_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wakes_blocked_consumer() {
        let q = Arc::new(TaskQueue::new());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.wait_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        q.push("job").unwrap();
        assert_eq!(consumer.join().unwrap(), Some("job"));
    }
}
