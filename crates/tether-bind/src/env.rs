//! Template environments
//!
//! A [`TemplateEnv`] is the scope templates are declared in: a module or the
//! global object. It owns the env script object, the engine job queue
//! handle, and registries of named functions and templates.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tether_engine::{Context, IntoAtom, JsHandler, PropertyFlags, Value};
use tether_thread::{NamedThreadOptions, NamedThreadPool};

use crate::error::Result;
use crate::function_template::FunctionTemplate;
use crate::object_template::ObjectTemplate;
use crate::schedule::ScheduleConfig;

/// Environment configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Module name, also the first routing key part
    pub name: String,
    pub appid: String,
    pub data_dir: PathBuf,
    pub app_dir: PathBuf,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    /// Env object installed as `globalThis[name]`
    Global,
    /// Env object handed to the module loader
    Module,
}

pub struct TemplateEnv {
    config: EnvConfig,
    kind: EnvKind,
    handler: JsHandler,
    object: Value,
    functions: Mutex<HashMap<String, Value>>,
    object_templates: Mutex<HashMap<String, Arc<ObjectTemplate>>>,
    function_templates: Mutex<HashMap<String, Arc<FunctionTemplate>>>,
}

impl std::fmt::Debug for TemplateEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEnv")
            .field("name", &self.config.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl TemplateEnv {
    pub fn new(ctx: &Context, config: EnvConfig, kind: EnvKind) -> Arc<Self> {
        let object = ctx.dup_value(&ctx.new_object());
        if kind == EnvKind::Global && !config.name.is_empty() {
            let global = ctx.global();
            if let Err(e) = ctx.define_property_value(&global, config.name.as_str(), object.clone(), PropertyFlags::ALL) {
                tracing::warn!("cannot install env {} on the global object: {}", config.name, e);
            }
        }
        tracing::debug!("env {} created ({:?})", config.name, kind);
        Arc::new(Self {
            config,
            kind,
            handler: ctx.handler(),
            object,
            functions: Mutex::new(HashMap::new()),
            object_templates: Mutex::new(HashMap::new()),
            function_templates: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn kind(&self) -> EnvKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn appid(&self) -> &str {
        &self.config.appid
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.config.data_dir
    }

    pub fn app_dir(&self) -> &std::path::Path {
        &self.config.app_dir
    }

    pub fn handler(&self) -> JsHandler {
        self.handler.clone()
    }

    /// The env script object
    pub fn object(&self) -> &Value {
        &self.object
    }

    /// Define `key` on the env object
    pub fn set_field(&self, ctx: &Context, key: impl IntoAtom, value: Value) -> Result<()> {
        ctx.define_property_value(&self.object, key, value, PropertyFlags::ALL)?;
        Ok(())
    }

    // === registries ===

    /// Keep `func` alive under `name`, releasing any function it replaces
    pub fn register_function(&self, ctx: &Context, name: &str, func: &Value) {
        let pinned = ctx.dup_value(func);
        let old = self.functions.lock().unwrap_or_else(PoisonError::into_inner).insert(name.to_string(), pinned);
        if let Some(old) = old {
            ctx.free_value(old);
        }
    }

    pub fn function(&self, name: &str) -> Option<Value> {
        self.functions.lock().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    pub fn unregister_function(&self, ctx: &Context, name: &str) -> bool {
        let old = self.functions.lock().unwrap_or_else(PoisonError::into_inner).remove(name);
        old.map(|f| ctx.free_value(f)).is_some()
    }

    pub fn register_object_template(&self, name: &str, template: Arc<ObjectTemplate>) {
        self.object_templates.lock().unwrap_or_else(PoisonError::into_inner).insert(name.to_string(), template);
    }

    pub fn object_template(&self, name: &str) -> Option<Arc<ObjectTemplate>> {
        self.object_templates.lock().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    pub fn register_function_template(&self, name: &str, template: Arc<FunctionTemplate>) {
        self.function_templates.lock().unwrap_or_else(PoisonError::into_inner).insert(name.to_string(), template);
    }

    pub fn function_template(&self, name: &str) -> Option<Arc<FunctionTemplate>> {
        self.function_templates.lock().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Register `template` and expose its constructor on the env object
    pub fn export_function_template(&self, ctx: &Context, name: &str, template: Arc<FunctionTemplate>) -> Result<()> {
        let func = template.get_function(ctx)?;
        self.set_field(ctx, name, func)?;
        self.register_function_template(name, template);
        Ok(())
    }

    /// Register `template` and expose a fresh instance on the env object
    pub fn export_object_template(&self, ctx: &Context, name: &str, template: Arc<ObjectTemplate>) -> Result<()> {
        let instance = template.new_instance(ctx)?;
        self.set_field(ctx, name, instance)?;
        self.register_object_template(name, template);
        Ok(())
    }

    // === threads ===

    /// Run `task` on the engine thread. False once the engine is gone.
    pub fn post_js_thread<F>(&self, task: F) -> bool
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        self.handler.post(task)
    }

    pub fn post_named_thread<F>(&self, name: &str, task: F, options: &NamedThreadOptions) -> tether_thread::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        NamedThreadPool::global().post(name, task, options)
    }

    /// Release registered functions and templates.
    ///
    /// Templates hold their env, so an env with registered templates is
    /// only freed after `clear`.
    pub fn clear(&self, ctx: &Context) {
        let functions: Vec<Value> = self
            .functions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, f)| f)
            .collect();
        for func in functions {
            ctx.free_value(func);
        }
        let objects = std::mem::take(&mut *self.object_templates.lock().unwrap_or_else(PoisonError::into_inner));
        let functions = std::mem::take(&mut *self.function_templates.lock().unwrap_or_else(PoisonError::into_inner));
        drop((objects, functions));
    }
}

impl Drop for TemplateEnv {
    fn drop(&mut self) {
        let mut pinned = vec![self.object.clone()];
        pinned.extend(
            self.functions
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .drain()
                .map(|(_, f)| f),
        );
        let released = self.handler.post(move |ctx| {
            for value in pinned {
                ctx.free_value(value);
            }
        });
        if !released {
            tracing::trace!("env {} dropped after its engine", self.config.name);
        }
    }
}
