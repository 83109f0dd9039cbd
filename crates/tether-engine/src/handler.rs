//! Engine-thread job queue

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tether_thread::TaskQueue;

use crate::context::{Context, Inner};
use crate::{Error, Result};

/// Job run on the engine thread with the context
pub type JsTask = Box<dyn FnOnce(&Context) + Send + 'static>;

thread_local! {
    /// Contexts owned by this thread, keyed by their queue address
    static CONTEXTS: RefCell<Vec<(usize, Weak<Inner>)>> = const { RefCell::new(Vec::new()) };
}

/// Thread-safe poster onto a context's job queue
#[derive(Clone)]
pub struct JsHandler {
    pub(crate) queue: Arc<TaskQueue<JsTask>>,
    pub(crate) thread: ThreadId,
}

impl std::fmt::Debug for JsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsHandler")
            .field("pending", &self.queue.len())
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

impl JsHandler {
    pub(crate) fn new() -> Self {
        Self {
            queue: Arc::new(TaskQueue::new()),
            thread: thread::current().id(),
        }
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.queue) as usize
    }

    pub(crate) fn register(&self, inner: &Rc<Inner>) {
        let key = self.key();
        CONTEXTS.with(|c| c.borrow_mut().push((key, Rc::downgrade(inner))));
    }

    pub(crate) fn unregister(&self) {
        let key = self.key();
        // thread-local may already be gone during thread exit
        let _ = CONTEXTS.try_with(|c| c.borrow_mut().retain(|(k, _)| *k != key));
    }

    /// Queue a job. Returns false once the context is gone.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        if self.queue.push(Box::new(task)).is_err() {
            tracing::debug!("engine context is gone, job dropped");
            return false;
        }
        true
    }

    /// Queue a job, reporting a closed queue as an error
    pub fn try_post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        self.queue.push(Box::new(task)).map_err(|_| Error::JobQueueClosed)
    }

    /// Run `f` with the owning context when called on the engine thread
    pub fn with_context<R>(&self, f: impl FnOnce(&Context) -> R) -> Option<R> {
        if !self.is_engine_thread() {
            return None;
        }
        let key = self.key();
        let inner = CONTEXTS
            .try_with(|c| {
                c.borrow()
                    .iter()
                    .find(|(k, _)| *k == key)
                    .and_then(|(_, weak)| weak.upgrade())
            })
            .ok()
            .flatten()?;
        let ctx = Context { inner };
        Some(f(&ctx))
    }

    /// True on the thread that owns the context
    pub fn is_engine_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// True while the owning context is alive
    pub fn is_alive(&self) -> bool {
        !self.queue.is_closed()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_with_context_only_on_engine_thread() {
        let ctx = Context::new();
        let handler = ctx.handler();
        let global = handler.with_context(|c| c.global());
        assert_eq!(global, Some(ctx.global()));

        let remote = handler.clone();
        let seen = std::thread::spawn(move || remote.with_context(|_| ()).is_some())
            .join()
            .unwrap();
        assert!(!seen);
    }

    #[test]
    fn test_with_context_picks_matching_context() {
        let a = Context::new();
        let b = Context::new();
        a.set_property(&a.global(), "tag", Value::from("a")).unwrap();
        b.set_property(&b.global(), "tag", Value::from("b")).unwrap();
        let tag = b
            .handler()
            .with_context(|ctx| ctx.get_property(&ctx.global(), "tag").unwrap())
            .unwrap();
        assert_eq!(tag, Value::from("b"));
    }

    #[test]
    fn test_try_post_after_drop() {
        let handler = Context::new().handler();
        assert_eq!(handler.try_post(|_| {}), Err(Error::JobQueueClosed));
        assert!(handler.with_context(|_| ()).is_none());
    }
}
