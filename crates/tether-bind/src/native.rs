//! Native objects and their engine binding
//!
//! A [`NativeObject`] is the Rust side of a script object. It moves through
//! a one-shot state machine: unattached, attached to exactly one engine
//! object, then detached when the engine finalizes that object. A detached
//! object can never be attached again.
//!
//! While attached, the engine owns one `Arc` through the object's opaque
//! slot. The object's per-instance state (script value fields, native ref
//! fields, signal listeners, GC hooks, async executor) lives in the side
//! tables of its [`ObjectTemplate`], keyed by [`NativeObject::id`].

use std::any::Any;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use tether_engine::{ClassDef, ClassId, Context, JsHandler, Marker, ObjectId, Value};

use crate::error::{BindError, Result};
use crate::executor::AsyncExecutor;
use crate::info::FunctionInfo;
use crate::object_template::ObjectTemplate;
use crate::side_table::{GcCollectHook, GcMarkHook, RefValue, Unsubscribe};

const NATIVE_CLASS: &str = "tether.NativeObject";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle hooks of a native type. Every hook defaults to doing nothing.
pub trait NativeHooks: Any + Send + Sync {
    /// Called once, right after the object is attached
    fn on_init(&self, _obj: &NativeObject, _ctx: &Context) {}

    /// Report script values held by the type itself. Must only mark.
    fn on_gc_mark(&self, _obj: &NativeObject, _marker: &mut Marker) {}

    /// Called first in the detach sequence
    fn on_gc_collect(&self, _obj: &NativeObject, _ctx: &Context) {}

    /// Called after a function template constructed this object
    fn on_ctor(&self, _obj: &NativeObject, _info: &mut FunctionInfo<'_>) {}
}

/// Plain base object used when a template has no object creator
impl NativeHooks for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachState {
    Unattached,
    Attached(ObjectId),
    Detached,
}

/// Native half of a script object
pub struct NativeObject {
    id: u64,
    hooks: Arc<dyn NativeHooks>,
    // same allocation as `hooks`, kept for downcasting
    any: Arc<dyn Any + Send + Sync>,
    state: Mutex<AttachState>,
    call_disabled: AtomicBool,
    template: OnceLock<Weak<ObjectTemplate>>,
    handler: OnceLock<JsHandler>,
}

impl std::fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeObject")
            .field("id", &self.id)
            .field("state", &*self.state.lock().unwrap_or_else(PoisonError::into_inner))
            .finish()
    }
}

fn native_class(ctx: &Context) -> ClassId {
    if let Some(class) = ctx.class_id(NATIVE_CLASS) {
        return class;
    }
    let def = ClassDef::new(NATIVE_CLASS)
        .finalizer(|ctx, opaque| {
            if let Ok(native) = opaque.downcast::<Arc<NativeObject>>() {
                native.detach(ctx);
                // the engine's reference goes with `native`
            }
        })
        .gc_mark(|payload, marker| {
            if let Some(native) = payload.downcast_ref::<Arc<NativeObject>>() {
                native.gc_mark(marker);
            }
        });
    ctx.register_class(def)
}

impl NativeObject {
    pub fn new<H: NativeHooks>(hooks: H) -> Arc<Self> {
        let hooks = Arc::new(hooks);
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            hooks: hooks.clone(),
            any: hooks,
            state: Mutex::new(AttachState::Unattached),
            call_disabled: AtomicBool::new(false),
            template: OnceLock::new(),
            handler: OnceLock::new(),
        })
    }

    /// A base object with no behaviour of its own
    pub fn base() -> Arc<Self> {
        Self::new(())
    }

    /// Stable identity, the side table key
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The hooks value, if it is a `T`
    pub fn hooks<T: NativeHooks>(&self) -> Option<Arc<T>> {
        self.any.clone().downcast::<T>().ok()
    }

    /// Native object backing `value`, if any
    pub fn from_value(ctx: &Context, value: &Value) -> Option<Arc<NativeObject>> {
        let class = ctx.class_id(NATIVE_CLASS)?;
        let opaque = ctx.opaque(value, class)?;
        opaque.downcast_ref::<Arc<NativeObject>>().cloned()
    }

    /// Create the engine object for this native object and run `on_init`
    pub fn attach(self: &Arc<Self>, ctx: &Context) -> Result<Value> {
        let value = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != AttachState::Unattached {
                return Err(BindError::NotAttachable);
            }
            let value = ctx.new_object_class(native_class(ctx), Some(Rc::new(Arc::clone(self))));
            let id = value.as_object().ok_or(tether_engine::Error::NotAnObject)?;
            *state = AttachState::Attached(id);
            value
        };
        let _ = self.handler.set(ctx.handler());
        tracing::trace!("native object {} attached as {}", self.id, value.as_object().map(|id| id.raw()).unwrap_or(0));
        self.hooks.on_init(self, ctx);
        Ok(value)
    }

    /// Run the detach sequence. Only the first call after attach does anything.
    ///
    /// Order: the type's `on_gc_collect`, registered collect hooks, script
    /// value fields, native ref fields, signal listeners.
    pub fn detach(&self, ctx: &Context) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !matches!(*state, AttachState::Attached(_)) {
                return;
            }
            *state = AttachState::Detached;
        }
        tracing::trace!("native object {} detached", self.id);
        self.hooks.on_gc_collect(self, ctx);
        let Some(template) = self.template() else {
            return;
        };
        let tables = &template.tables;
        if let Some(hooks) = tables.gc_hooks.remove(self.id) {
            for hook in hooks.collect_hooks {
                hook(self, ctx);
            }
        }
        drop(tables.values.remove(self.id));
        drop(tables.refs.remove(self.id));
        drop(tables.signals.remove(self.id));
    }

    /// Report every script value reachable from this object
    pub fn gc_mark(&self, marker: &mut Marker) {
        self.hooks.on_gc_mark(self, marker);
        let Some(template) = self.template() else {
            return;
        };
        let tables = &template.tables;
        let hooks = tables.gc_hooks.with(self.id, |h| h.mark_hooks.clone()).unwrap_or_default();
        for hook in hooks {
            hook(self, marker);
        }
        tables.values.with(self.id, |fields| fields.mark(marker));
        tables.signals.with(self.id, |signals| signals.mark(marker));
    }

    pub fn is_attached(&self) -> bool {
        matches!(*self.state.lock().unwrap_or_else(PoisonError::into_inner), AttachState::Attached(_))
    }

    pub fn is_detached(&self) -> bool {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) == AttachState::Detached
    }

    /// The engine object while attached
    pub fn js_value(&self) -> Option<Value> {
        match *self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            AttachState::Attached(id) => Some(Value::Object(id)),
            _ => None,
        }
    }

    pub(crate) fn set_template(&self, template: &Arc<ObjectTemplate>) {
        let _ = self.template.set(Arc::downgrade(template));
    }

    /// Template the object was instantiated from
    pub fn template(&self) -> Option<Arc<ObjectTemplate>> {
        self.template.get().and_then(Weak::upgrade)
    }

    /// Engine job queue, known once attached
    pub fn handler(&self) -> Option<JsHandler> {
        self.handler
            .get()
            .cloned()
            .or_else(|| self.template().map(|t| t.env().handler()))
    }

    pub fn set_js_call_disabled(&self, disabled: bool) {
        self.call_disabled.store(disabled, Ordering::Release);
    }

    pub fn is_js_call_disabled(&self) -> bool {
        self.call_disabled.load(Ordering::Acquire)
    }

    // === script value fields ===

    /// Store a traced script value. Returns false when not attached.
    pub fn set_field(&self, key: &str, value: Value) -> bool {
        let Some(template) = self.attached_template() else {
            tracing::debug!("native object {} has no live binding, field {} dropped", self.id, key);
            return false;
        };
        template.tables.values.with_or_create(self.id, |fields| fields.set(key, value));
        true
    }

    pub fn field(&self, key: &str) -> Option<Value> {
        self.template()?.tables.values.with(self.id, |fields| fields.get(key)).flatten()
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.template()
            .and_then(|t| t.tables.values.with(self.id, |fields| fields.contains(key)))
            .unwrap_or(false)
    }

    pub fn remove_field(&self, key: &str) -> Option<Value> {
        self.template()?.tables.values.with_mut(self.id, |fields| fields.remove(key)).flatten()
    }

    /// Drop every script value field
    pub fn clear_fields(&self) {
        if let Some(template) = self.template() {
            drop(template.tables.values.remove(self.id));
        }
    }

    // === native ref fields ===

    pub fn set_ref_field(&self, key: &str, value: RefValue) -> bool {
        let Some(template) = self.template() else {
            return false;
        };
        let old = template.tables.refs.with_or_create(self.id, |fields| fields.set(key, value));
        drop(old);
        true
    }

    pub fn ref_field(&self, key: &str) -> Option<RefValue> {
        self.template()?.tables.refs.with(self.id, |fields| fields.get(key)).flatten()
    }

    /// Ref field downcast to its concrete type
    pub fn ref_field_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.ref_field(key)?.downcast::<T>().ok()
    }

    pub fn has_ref_field(&self, key: &str) -> bool {
        self.template()
            .and_then(|t| t.tables.refs.with(self.id, |fields| fields.contains(key)))
            .unwrap_or(false)
    }

    pub fn remove_ref_field(&self, key: &str) -> Option<RefValue> {
        self.template()?.tables.refs.with_mut(self.id, |fields| fields.remove(key)).flatten()
    }

    // === signals ===

    /// Add a listener for `prop`. None when not attached.
    pub fn subscribe_signal(&self, prop: &str, listener: Value) -> Option<u32> {
        let template = self.attached_template()?;
        Some(template.tables.signals.with_or_create(self.id, |s| s.subscribe(prop, listener)))
    }

    /// Remove listeners for `prop`, returning how many went away
    pub fn unsubscribe_signal(&self, prop: &str, which: Unsubscribe) -> usize {
        self.template()
            .and_then(|t| t.tables.signals.with_mut(self.id, |s| s.unsubscribe(prop, &which)))
            .map_or(0, |removed| removed.len())
    }

    pub fn signal_listener_count(&self, prop: &str) -> usize {
        self.template()
            .and_then(|t| t.tables.signals.with(self.id, |s| s.count(prop)))
            .unwrap_or(0)
    }

    /// Call every listener of `prop` with `args`.
    ///
    /// Listeners are copied before the first call, so listeners may
    /// subscribe or unsubscribe while being notified. A throwing listener
    /// is logged and the rest still run. Returns the number of listeners
    /// called.
    pub fn publish_signal(&self, ctx: &Context, prop: &str, args: &[Value]) -> usize {
        let Some(template) = self.template() else {
            return 0;
        };
        let listeners = template.tables.signals.with(self.id, |s| s.listeners(prop)).unwrap_or_default();
        for listener in &listeners {
            if ctx.call(listener, &Value::Undefined, args).is_err() {
                tracing::warn!("signal {} listener threw", prop);
                ctx.dump_pending();
            }
        }
        listeners.len()
    }

    // === GC hooks ===

    /// Register an extra mark hook, run on every trace until detach
    pub fn hook_gc_mark(&self, hook: GcMarkHook) {
        match self.template() {
            Some(template) => template.tables.gc_hooks.with_or_create(self.id, |h| h.mark_hooks.push(hook)),
            None => tracing::debug!("native object {} has no template, mark hook ignored", self.id),
        }
    }

    /// Register a hook run once during detach
    pub fn hook_gc_collect(&self, hook: GcCollectHook) {
        match self.template() {
            Some(template) => template.tables.gc_hooks.with_or_create(self.id, |h| h.collect_hooks.push(hook)),
            None => tracing::debug!("native object {} has no template, collect hook ignored", self.id),
        }
    }

    // === async ===

    pub fn async_executor(&self) -> Option<Arc<AsyncExecutor>> {
        self.template()?.tables.executors.with(self.id, Arc::clone)
    }

    /// Executor for this object, created on first use
    pub fn get_or_create_async_executor(&self) -> Option<Arc<AsyncExecutor>> {
        let template = self.template()?;
        let handler = self.handler()?;
        Some(
            template
                .tables
                .executors
                .with_or_create_with(self.id, || Arc::new(AsyncExecutor::new(handler)), |executor| Arc::clone(executor)),
        )
    }

    pub(crate) fn on_ctor(&self, info: &mut FunctionInfo<'_>) {
        self.hooks.on_ctor(self, info);
    }

    fn attached_template(&self) -> Option<Arc<ObjectTemplate>> {
        if !self.is_attached() {
            return None;
        }
        self.template()
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        let Some(template) = self.template() else {
            return;
        };
        let tables = &template.tables;
        let executor = tables.executors.remove(self.id);
        let refs = tables.refs.remove(self.id);
        let signals = tables.signals.remove(self.id);
        let values = tables.values.remove(self.id);
        let hooks = tables.gc_hooks.remove(self.id);
        drop((executor, refs, signals, values, hooks));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        inits: AtomicUsize,
        collects: AtomicUsize,
    }

    impl NativeHooks for Counting {
        fn on_init(&self, _obj: &NativeObject, _ctx: &Context) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn on_gc_collect(&self, _obj: &NativeObject, _ctx: &Context) {
            self.collects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_attach_is_one_shot() {
        let ctx = Context::new();
        let native = NativeObject::new(Counting::default());
        let value = native.attach(&ctx).unwrap();
        assert!(native.is_attached());
        assert_eq!(native.attach(&ctx), Err(BindError::NotAttachable));
        assert_eq!(native.hooks::<Counting>().unwrap().inits.load(Ordering::SeqCst), 1);

        let found = NativeObject::from_value(&ctx, &value).unwrap();
        assert_eq!(found.id(), native.id());
    }

    #[test]
    fn test_finalize_detaches_once() {
        let ctx = Context::new();
        let native = NativeObject::new(Counting::default());
        native.attach(&ctx).unwrap();
        ctx.run_gc();
        assert!(native.is_detached());
        native.detach(&ctx);
        assert_eq!(native.hooks::<Counting>().unwrap().collects.load(Ordering::SeqCst), 1);
        assert_eq!(native.attach(&ctx), Err(BindError::NotAttachable));
    }

    #[test]
    fn test_engine_releases_its_reference() {
        let ctx = Context::new();
        let native = NativeObject::base();
        native.attach(&ctx).unwrap();
        assert_eq!(Arc::strong_count(&native), 2);
        ctx.run_gc();
        assert_eq!(Arc::strong_count(&native), 1);
    }

    #[test]
    fn test_fields_need_a_template() {
        let native = NativeObject::base();
        assert!(!native.set_field("x", Value::Int(1)));
        assert!(native.field("x").is_none());
        assert!(native.subscribe_signal("changed", Value::Null).is_none());
        assert!(native.async_executor().is_none());
    }

    #[test]
    fn test_async_executor_is_created_once() {
        let ctx = Context::new();
        let env = crate::env::TemplateEnv::new(&ctx, crate::env::EnvConfig::default(), crate::env::EnvKind::Module);
        let tpl = ObjectTemplate::new(&env);
        let obj = tpl.new_instance_with(&ctx, true).unwrap();
        let native = NativeObject::from_value(&ctx, &obj).unwrap();
        assert!(native.async_executor().is_none());

        let first = native.get_or_create_async_executor().unwrap();
        let second = native.get_or_create_async_executor().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &native.async_executor().unwrap()));
    }

    #[test]
    fn test_identities_are_unique() {
        let a = NativeObject::base();
        let b = NativeObject::base();
        assert_ne!(a.id(), b.id());
    }
}
