//! Routing of async bodies onto worker threads
//!
//! Every async dispatch gets a routing key built from the template's module
//! name, function name, app id and the native object's identity, as selected
//! by the schedule mode. Bodies with the same key run in order on one named
//! worker thread. A schedule hook may send a dispatch elsewhere instead.

use std::sync::Arc;

use serde::Deserialize;
use tether_thread::{Handler, NamedThreadOptions, NamedThreadPool, ThreadPool};

use crate::info::AsyncInfo;
use crate::native::NativeObject;
use crate::object_template::ObjectTemplate;
use crate::property::AsyncBody;

pub const MODE_MODULE: u32 = 1 << 0;
pub const MODE_FUNCTION: u32 = 1 << 1;
pub const MODE_APP: u32 = 1 << 2;
pub const MODE_OBJECT: u32 = 1 << 3;

/// Schedule configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Bitmask of `MODE_*` key parts
    pub mode: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { mode: MODE_MODULE }
    }
}

/// Inspects a pending dispatch and may pick its destination
pub type ScheduleHook = Arc<dyn Fn(&mut ScheduleInfo<'_>) + Send + Sync>;

/// Where a dispatch runs
#[derive(Debug, Clone)]
pub enum ScheduleTarget {
    ThreadPool(Arc<ThreadPool>),
    Handler(Handler),
    NamedThread { name: String, options: NamedThreadOptions },
}

/// A pending dispatch, as seen by a [`ScheduleHook`]
pub struct ScheduleInfo<'a> {
    template: &'a Arc<ObjectTemplate>,
    native: &'a Arc<NativeObject>,
    info: &'a mut AsyncInfo,
    thread_pool: Option<Arc<ThreadPool>>,
    handler: Option<Handler>,
    thread_name: String,
    options: NamedThreadOptions,
}

impl<'a> ScheduleInfo<'a> {
    pub fn module_name(&self) -> String {
        self.template.module_name()
    }

    pub fn function_name(&self) -> String {
        self.template.function_name()
    }

    pub fn appid(&self) -> String {
        self.template.appid()
    }

    pub fn template(&self) -> &Arc<ObjectTemplate> {
        self.template
    }

    pub fn native(&self) -> &Arc<NativeObject> {
        self.native
    }

    pub fn native_id(&self) -> u64 {
        self.native.id()
    }

    pub fn property_name(&self) -> &str {
        self.info.property()
    }

    pub fn async_info(&mut self) -> &mut AsyncInfo {
        self.info
    }

    pub fn set_thread_pool(&mut self, pool: Arc<ThreadPool>) {
        self.thread_pool = Some(pool);
    }

    pub fn set_handler(&mut self, handler: Handler) {
        self.handler = Some(handler);
    }

    /// Named thread to run on. Starts out as the routing key.
    pub fn set_thread_name(&mut self, name: impl Into<String>) {
        self.thread_name = name.into();
    }

    pub fn set_thread_stack_size(&mut self, stack_size: usize) {
        self.options.stack_size = stack_size;
    }

    pub fn set_thread_priority(&mut self, priority: i32) {
        self.options.priority = priority;
    }

    pub fn set_thread_keep_alive_ms(&mut self, keep_alive_ms: u64) {
        self.options.keep_alive_ms = keep_alive_ms;
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Chosen destination: thread pool, then handler, then named thread
    pub fn target(&self, key: &str) -> ScheduleTarget {
        if let Some(pool) = &self.thread_pool {
            return ScheduleTarget::ThreadPool(Arc::clone(pool));
        }
        if let Some(handler) = &self.handler {
            return ScheduleTarget::Handler(handler.clone());
        }
        let name = if self.thread_name.is_empty() {
            tracing::warn!("schedule hook cleared the thread name, using {}", key);
            key.to_string()
        } else {
            self.thread_name.clone()
        };
        ScheduleTarget::NamedThread { name, options: self.options.clone() }
    }
}

/// Per-template dispatch policy
#[derive(Clone, Default)]
pub struct AsyncSchedule {
    config: ScheduleConfig,
    hook: Option<ScheduleHook>,
}

impl std::fmt::Debug for AsyncSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSchedule")
            .field("mode", &self.config.mode)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl AsyncSchedule {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config, hook: None }
    }

    pub fn mode(&self) -> u32 {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: u32) {
        self.config.mode = mode;
    }

    pub fn set_hook(&mut self, hook: ScheduleHook) {
        self.hook = Some(hook);
    }

    /// Routing key, e.g. `<m>device<o>42`
    pub fn routing_key(&self, template: &ObjectTemplate, native: &NativeObject) -> String {
        let mode = self.config.mode;
        let mut key = String::new();
        if mode & MODE_MODULE != 0 {
            key.push_str("<m>");
            key.push_str(&template.module_name());
        }
        if mode & MODE_FUNCTION != 0 {
            key.push_str("<f>");
            key.push_str(&template.function_name());
        }
        if mode & MODE_APP != 0 {
            key.push_str("<a>");
            key.push_str(&template.appid());
        }
        if mode & MODE_OBJECT != 0 {
            key.push_str("<o>");
            key.push_str(&native.id().to_string());
        }
        key
    }

    /// Run `body(info)` at the chosen destination
    pub fn dispatch(
        &self,
        template: &Arc<ObjectTemplate>,
        native: &Arc<NativeObject>,
        body: AsyncBody,
        mut info: AsyncInfo,
    ) {
        let key = self.routing_key(template, native);
        let target = match &self.hook {
            Some(hook) => {
                let mut schedule = ScheduleInfo {
                    template,
                    native,
                    info: &mut info,
                    thread_pool: None,
                    handler: None,
                    thread_name: key.clone(),
                    options: NamedThreadOptions::default(),
                };
                hook(&mut schedule);
                schedule.target(&key)
            }
            None => ScheduleTarget::NamedThread { name: key, options: NamedThreadOptions::default() },
        };
        tracing::trace!("dispatch {} to {:?}", info.property(), target);
        let task = move || body(&info);
        match target {
            ScheduleTarget::ThreadPool(pool) => {
                if !pool.submit(task) {
                    tracing::warn!("thread pool {} is shut down, async body dropped", pool.name());
                }
            }
            ScheduleTarget::Handler(handler) => {
                if !handler.post(task) {
                    tracing::warn!("handler {} has quit, async body dropped", handler.name());
                }
            }
            ScheduleTarget::NamedThread { name, options } => {
                if let Err(e) = NamedThreadPool::global().post(&name, task, &options) {
                    tracing::warn!("async body for {} dropped: {}", name, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_module() {
        assert_eq!(ScheduleConfig::default().mode, MODE_MODULE);
        assert_eq!(AsyncSchedule::default().mode(), MODE_MODULE);
    }
}
