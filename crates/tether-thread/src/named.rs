//! Named Thread Pool
//!
//! Registry of worker threads keyed by name. A worker is created on the first
//! post for its name, runs closures in FIFO order, and deregisters itself
//! after staying idle for its keep-alive period. Enqueueing and
//! self-deregistration happen under the same registry lock, so a closure can
//! never land in the queue of a worker that already decided to exit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::{run_task, Result, TaskFn, ThreadError};

/// Default idle period before a named worker exits
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 10_000;

/// Upper bound for the idle period
pub const MAX_KEEP_ALIVE_MS: u64 = 30_000;

/// Options applied when a named worker is created
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NamedThreadOptions {
    /// Stack size in bytes, 0 for the platform default
    pub stack_size: usize,
    /// Scheduling priority hint. Recorded for diagnostics; std threads
    /// expose no portable priority control.
    pub priority: i32,
    /// Idle period in milliseconds, clamped to [`MAX_KEEP_ALIVE_MS`]
    pub keep_alive_ms: u64,
}

impl Default for NamedThreadOptions {
    fn default() -> Self {
        Self {
            stack_size: 0,
            priority: 0,
            keep_alive_ms: DEFAULT_KEEP_ALIVE_MS,
        }
    }
}

impl NamedThreadOptions {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms.min(MAX_KEEP_ALIVE_MS))
    }
}

struct Slot {
    generation: u64,
    queue: VecDeque<TaskFn>,
    wake: Arc<Condvar>,
}

#[derive(Default)]
struct Registry {
    threads: HashMap<String, Slot>,
    next_generation: u64,
}

impl Registry {
    fn is_current(&self, name: &str, generation: u64) -> bool {
        self.threads.get(name).is_some_and(|slot| slot.generation == generation)
    }
}

#[derive(Default)]
struct Shared {
    registry: Mutex<Registry>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of named worker threads
#[derive(Clone, Default)]
pub struct NamedThreadPool {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for NamedThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedThreadPool")
            .field("threads", &self.thread_count())
            .finish()
    }
}

static GLOBAL: OnceLock<NamedThreadPool> = OnceLock::new();

/// Post onto the process-wide pool
pub fn post_on_named_thread<F>(name: &str, task: F, options: &NamedThreadOptions) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    NamedThreadPool::global().post(name, task, options)
}

impl NamedThreadPool {
    /// Create an independent registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static NamedThreadPool {
        GLOBAL.get_or_init(NamedThreadPool::new)
    }

    /// Queue `task` on the worker called `name`, creating it if needed.
    /// Options only apply when this call creates the worker.
    pub fn post<F>(&self, name: &str, task: F, options: &NamedThreadOptions) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut registry = self.shared.lock();

        if let Some(slot) = registry.threads.get_mut(name) {
            slot.queue.push_back(Box::new(task));
            slot.wake.notify_one();
            return Ok(());
        }

        let generation = registry.next_generation;
        registry.next_generation += 1;
        let wake = Arc::new(Condvar::new());
        let mut queue: VecDeque<TaskFn> = VecDeque::new();
        queue.push_back(Box::new(task));
        registry.threads.insert(
            name.to_string(),
            Slot { generation, queue, wake: Arc::clone(&wake) },
        );

        let shared = Arc::clone(&self.shared);
        let worker_name = name.to_string();
        let keep_alive = options.keep_alive();
        let mut builder = thread::Builder::new().name(name.to_string());
        if options.stack_size > 0 {
            builder = builder.stack_size(options.stack_size);
        }
        let spawned = builder.spawn(move || run_worker(shared, worker_name, generation, wake, keep_alive));

        match spawned {
            Ok(_) => {
                tracing::debug!(
                    "named thread {} added (priority {}, keep-alive {:?})",
                    name,
                    options.priority,
                    keep_alive
                );
                Ok(())
            }
            Err(source) => {
                registry.threads.remove(name);
                tracing::error!("named thread {} failed to start: {}", name, source);
                Err(ThreadError::Spawn { name: name.to_string(), source })
            }
        }
    }

    /// Number of live workers
    pub fn thread_count(&self) -> usize {
        self.shared.lock().threads.len()
    }

    /// True while a worker for `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.shared.lock().threads.contains_key(name)
    }
}

fn run_worker(shared: Arc<Shared>, name: String, generation: u64, wake: Arc<Condvar>, keep_alive: Duration) {
    let mut registry = shared.lock();
    loop {
        let task = match registry.threads.get_mut(&name) {
            Some(slot) if slot.generation == generation => slot.queue.pop_front(),
            _ => return,
        };

        if let Some(task) = task {
            drop(registry);
            run_task(&name, task);
            registry = shared.lock();
            continue;
        }

        registry = wake
            .wait_timeout_while(registry, keep_alive, |reg| {
                reg.threads
                    .get(&name)
                    .is_some_and(|slot| slot.generation == generation && slot.queue.is_empty())
            })
            .unwrap_or_else(PoisonError::into_inner)
            .0;

        let idle = registry
            .threads
            .get(&name)
            .is_none_or(|slot| slot.generation != generation || slot.queue.is_empty());
        if idle {
            if registry.is_current(&name, generation) {
                registry.threads.remove(&name);
            }
            tracing::debug!("named thread {} removed after idle timeout", name);
            return;
        }
    }
}
