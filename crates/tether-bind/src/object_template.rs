//! Object templates
//!
//! An [`ObjectTemplate`] declares a shape once: constants, native methods,
//! accessors, nested templates, signals and async methods. Every
//! [`ObjectTemplate::new_instance`] stamps out a script object with those
//! properties injected.
//!
//! Bound functions do not capture anything. They carry two reference slots
//! (the template and, when present, the native object) and a magic number
//! naming the property and call mode, and every call goes through one
//! dispatcher.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tether_engine::{Context, ErrorKind, Invocation, PropertyFlags, Value};

use crate::convert::{args_to_params, js_to_value_tree};
use crate::env::TemplateEnv;
use crate::error::{BindError, Result};
use crate::executor::{AsyncExecutor, CallbackKind};
use crate::function_template::FunctionTemplate;
use crate::info::{AsyncInfo, FunctionInfo, PrepareInfo};
use crate::native::NativeObject;
use crate::property::{
    AsyncBody, AsyncKind, Callable, PropertyHandle, PropertyKind, PropertySpec, SignalBinder,
};
use crate::refs::{new_ref, ref_payload};
use crate::schedule::{AsyncSchedule, ScheduleInfo};
use crate::side_table::{SideTables, Unsubscribe};

/// Builds the native object behind each instance
pub type ObjectCreator = Arc<dyn Fn() -> Option<Arc<NativeObject>> + Send + Sync>;

const MODE_CALL: i32 = 0;
const MODE_GET: i32 = 1;
const MODE_SET: i32 = 2;

fn magic(index: usize, mode: i32) -> i32 {
    ((index as i32) << 2) | mode
}

fn unmagic(magic: i32) -> (usize, i32) {
    ((magic >> 2) as usize, magic & 3)
}

/// Declared object shape
pub struct ObjectTemplate {
    env: Arc<TemplateEnv>,
    properties: Mutex<Vec<PropertySpec>>,
    creator: Mutex<Option<ObjectCreator>>,
    schedule: Mutex<AsyncSchedule>,
    function_template: Mutex<Weak<FunctionTemplate>>,
    pub(crate) tables: SideTables,
}

impl std::fmt::Debug for ObjectTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTemplate")
            .field("module", &self.module_name())
            .field("properties", &*self.lock_properties())
            .finish()
    }
}

impl ObjectTemplate {
    pub fn new(env: &Arc<TemplateEnv>) -> Arc<Self> {
        Arc::new(Self {
            env: Arc::clone(env),
            properties: Mutex::new(Vec::new()),
            creator: Mutex::new(None),
            schedule: Mutex::new(AsyncSchedule::new(env.config().schedule)),
            function_template: Mutex::new(Weak::new()),
            tables: SideTables::default(),
        })
    }

    fn lock_properties(&self) -> std::sync::MutexGuard<'_, Vec<PropertySpec>> {
        self.properties.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn env(&self) -> &Arc<TemplateEnv> {
        &self.env
    }

    pub fn module_name(&self) -> String {
        self.env.name().to_string()
    }

    pub fn appid(&self) -> String {
        self.env.appid().to_string()
    }

    /// Name of the owning function template, empty if none
    pub fn function_name(&self) -> String {
        self.function_template()
            .map(|t| t.name().to_string())
            .unwrap_or_default()
    }

    pub fn function_template(&self) -> Option<Arc<FunctionTemplate>> {
        self.function_template.lock().unwrap_or_else(PoisonError::into_inner).upgrade()
    }

    pub(crate) fn set_owner(&self, owner: &Arc<FunctionTemplate>) {
        *self.function_template.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(owner);
    }

    // === declaration ===

    /// Declare `name`. Declaring an existing name replaces it in place.
    pub fn set(&self, name: &str, kind: PropertyKind) -> PropertyHandle<'_> {
        let mut properties = self.lock_properties();
        let spec = PropertySpec::new(name, kind);
        let index = match properties.iter().position(|p| p.name == name) {
            Some(index) => {
                properties[index] = spec;
                index
            }
            None => {
                properties.push(spec);
                properties.len() - 1
            }
        };
        PropertyHandle { template: self, index }
    }

    pub(crate) fn update_property(&self, index: usize, f: impl FnOnce(&mut PropertySpec)) {
        if let Some(spec) = self.lock_properties().get_mut(index) {
            f(spec);
        }
    }

    pub fn set_bool(&self, name: &str, value: bool) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::Bool(value))
    }

    pub fn set_int(&self, name: &str, value: i32) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::Int32(value))
    }

    pub fn set_uint(&self, name: &str, value: u32) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::Uint32(value))
    }

    pub fn set_double(&self, name: &str, value: f64) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::Double(value))
    }

    pub fn set_string(&self, name: &str, value: impl Into<String>) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::String(value.into()))
    }

    /// Method taking a [`FunctionInfo`]
    pub fn set_function<F>(&self, name: &str, f: F) -> PropertyHandle<'_>
    where
        F: Fn(&mut FunctionInfo<'_>) + Send + Sync + 'static,
    {
        self.set(name, PropertyKind::Function(Callable::info(f)))
    }

    /// Method with the plain `(ctx, this, args)` signature
    pub fn set_raw_function<F>(&self, name: &str, f: F) -> PropertyHandle<'_>
    where
        F: Fn(&Context, &Value, &[Value]) -> tether_engine::Result<Value> + Send + Sync + 'static,
    {
        self.set(name, PropertyKind::Function(Callable::raw(f)))
    }

    pub fn set_accessor(&self, name: &str, getter: Option<Callable>, setter: Option<Callable>) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::Accessor { getter, setter })
    }

    pub fn set_accessor_template(
        &self,
        name: &str,
        getter: Arc<FunctionTemplate>,
        setter: Option<Arc<FunctionTemplate>>,
    ) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::AccessorTemplate { getter, setter })
    }

    pub fn set_function_template(&self, name: &str, template: Arc<FunctionTemplate>) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::FunctionTemplate(template))
    }

    pub fn set_object_template(&self, name: &str, template: Arc<ObjectTemplate>) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::ObjectTemplate(template))
    }

    /// Signal sub-object. `binder` runs once per instance with its native object.
    pub fn set_signal(&self, name: &str, binder: Option<SignalBinder>) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::Signal { binder })
    }

    /// Signal sub-object with a `value` accessor
    pub fn set_signal_property(
        &self,
        name: &str,
        binder: Option<SignalBinder>,
        getter: Option<Callable>,
        setter: Option<Callable>,
    ) -> PropertyHandle<'_> {
        self.set(name, PropertyKind::SignalProperty { binder, getter, setter })
    }

    /// `obj.name(params, cb?)`, with `cb(result)`
    pub fn set_async<F>(&self, name: &str, body: F) -> PropertyHandle<'_>
    where
        F: Fn(&AsyncInfo) + Send + Sync + 'static,
    {
        self.set(name, PropertyKind::Async { kind: AsyncKind::FireAndForget, body: Arc::new(body) })
    }

    /// `obj.name(...args, cb)`, with `cb(err, result)`
    pub fn set_async_std<F>(&self, name: &str, body: F) -> PropertyHandle<'_>
    where
        F: Fn(&AsyncInfo) + Send + Sync + 'static,
    {
        self.set(name, PropertyKind::Async { kind: AsyncKind::Std, body: Arc::new(body) })
    }

    /// `obj.name(...args)` returning a promise
    pub fn set_promise<F>(&self, name: &str, body: F) -> PropertyHandle<'_>
    where
        F: Fn(&AsyncInfo) + Send + Sync + 'static,
    {
        self.set(name, PropertyKind::Async { kind: AsyncKind::Promise, body: Arc::new(body) })
    }

    pub fn set_object_creator<F>(&self, creator: F)
    where
        F: Fn() -> Option<Arc<NativeObject>> + Send + Sync + 'static,
    {
        *self.creator.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(creator));
    }

    pub fn set_async_schedule_mode(&self, mode: u32) {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner).set_mode(mode);
    }

    pub fn set_async_schedule_hook<F>(&self, hook: F)
    where
        F: Fn(&mut ScheduleInfo<'_>) + Send + Sync + 'static,
    {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner).set_hook(Arc::new(hook));
    }

    pub fn async_schedule(&self) -> AsyncSchedule {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // === queries ===

    pub fn properties(&self) -> Vec<PropertySpec> {
        self.lock_properties().clone()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.lock_properties().iter().any(|p| p.name == name)
    }

    pub fn has_async_property(&self) -> bool {
        self.lock_properties().iter().any(|p| p.kind.is_async())
    }

    fn needs_native(&self) -> bool {
        self.lock_properties().iter().any(|p| {
            matches!(
                p.kind,
                PropertyKind::Async { .. } | PropertyKind::Signal { .. } | PropertyKind::SignalProperty { .. }
            )
        })
    }

    // === instantiation ===

    pub fn new_instance(self: &Arc<Self>, ctx: &Context) -> Result<Value> {
        self.new_instance_with(ctx, false)
    }

    /// New instance. A native object backs it when `force_native` is set,
    /// an object creator exists, or a property needs one.
    pub fn new_instance_with(self: &Arc<Self>, ctx: &Context, force_native: bool) -> Result<Value> {
        let (object, native) = self.create_object(ctx, force_native)?;
        self.inject(ctx, &object, native.as_ref())?;
        Ok(object)
    }

    pub(crate) fn create_object(
        self: &Arc<Self>,
        ctx: &Context,
        force_native: bool,
    ) -> Result<(Value, Option<Arc<NativeObject>>)> {
        let creator = self.creator.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if !force_native && creator.is_none() && !self.needs_native() {
            return Ok((ctx.new_object(), None));
        }
        let native = match creator {
            Some(creator) => creator().ok_or(BindError::CreatorReturnedNone)?,
            None => NativeObject::base(),
        };
        native.set_template(self);
        let object = native.attach(ctx)?;
        Ok((object, Some(native)))
    }

    /// Define every declared property on `object`
    pub(crate) fn inject(self: &Arc<Self>, ctx: &Context, object: &Value, native: Option<&Arc<NativeObject>>) -> Result<()> {
        let specs = self.properties();
        let data = vec![
            new_ref(ctx, Arc::clone(self)),
            native.map(|n| new_ref(ctx, Arc::clone(n))).unwrap_or_default(),
        ];
        let bound = |index: usize, name: &str, mode: i32| {
            ctx.new_function(name, 0, magic(index, mode), data.clone(), Self::caller)
        };
        for (index, spec) in specs.iter().enumerate() {
            let name = spec.name.as_str();
            let flags = spec.flags;
            match &spec.kind {
                PropertyKind::Bool(v) => ctx.define_property_value(object, name, Value::Bool(*v), flags)?,
                PropertyKind::Int32(v) => ctx.define_property_value(object, name, Value::Int(*v), flags)?,
                PropertyKind::Uint32(v) => ctx.define_property_value(object, name, Value::from(*v), flags)?,
                PropertyKind::Double(v) => ctx.define_property_value(object, name, Value::Float(*v), flags)?,
                PropertyKind::String(v) => ctx.define_property_value(object, name, Value::from(v.as_str()), flags)?,
                PropertyKind::Function(_) | PropertyKind::Async { .. } => {
                    ctx.define_property_value(object, name, bound(index, name, MODE_CALL), flags)?
                }
                PropertyKind::Accessor { getter, setter } => {
                    let getter = getter.as_ref().map(|_| bound(index, name, MODE_GET));
                    let setter = setter.as_ref().map(|_| bound(index, name, MODE_SET));
                    ctx.define_property_accessor(object, name, getter, setter, flags)?
                }
                PropertyKind::AccessorTemplate { getter, setter } => {
                    let getter = getter.get_function(ctx)?;
                    let setter = setter.as_ref().map(|s| s.get_function(ctx)).transpose()?;
                    ctx.define_property_accessor(object, name, Some(getter), setter, flags)?
                }
                PropertyKind::FunctionTemplate(template) => {
                    ctx.define_property_value(object, name, template.get_function(ctx)?, flags)?
                }
                PropertyKind::ObjectTemplate(template) => {
                    ctx.define_property_value(object, name, template.new_instance(ctx)?, flags)?
                }
                PropertyKind::Signal { binder } => {
                    bind_signal(binder.as_ref(), native, name);
                    let publisher = self.signal_publisher(ctx, index, name, &data)?;
                    ctx.define_property_value(object, name, publisher, flags)?
                }
                PropertyKind::SignalProperty { binder, getter, setter } => {
                    bind_signal(binder.as_ref(), native, name);
                    let publisher = self.signal_publisher(ctx, index, name, &data)?;
                    let getter = getter.as_ref().map(|_| bound(index, name, MODE_GET));
                    let setter = setter.as_ref().map(|_| bound(index, name, MODE_SET));
                    ctx.define_property_accessor(&publisher, "value", getter, setter, PropertyFlags::NONE)?;
                    ctx.define_property_value(object, name, publisher, flags)?
                }
            }
        }
        Ok(())
    }

    fn signal_publisher(&self, ctx: &Context, index: usize, name: &str, data: &[Value]) -> Result<Value> {
        let publisher = ctx.new_object();
        let on = ctx.new_function(name, 1, magic(index, MODE_CALL), data.to_vec(), signal_on);
        let off = ctx.new_function(name, 1, magic(index, MODE_CALL), data.to_vec(), signal_off);
        ctx.define_property_value(&publisher, "on", on, PropertyFlags::NONE)?;
        ctx.define_property_value(&publisher, "off", off, PropertyFlags::NONE)?;
        Ok(publisher)
    }

    /// Independent copy. Nested templates are copied too, callbacks are shared.
    pub fn clone_template(&self) -> Arc<ObjectTemplate> {
        let properties = self
            .properties()
            .into_iter()
            .map(|mut spec| {
                spec.kind = match spec.kind {
                    PropertyKind::ObjectTemplate(t) => PropertyKind::ObjectTemplate(t.clone_template()),
                    PropertyKind::FunctionTemplate(t) => PropertyKind::FunctionTemplate(t.clone_template()),
                    PropertyKind::AccessorTemplate { getter, setter } => PropertyKind::AccessorTemplate {
                        getter: getter.clone_template(),
                        setter: setter.map(|s| s.clone_template()),
                    },
                    other => other,
                };
                spec
            })
            .collect();
        Arc::new(Self {
            env: Arc::clone(&self.env),
            properties: Mutex::new(properties),
            creator: Mutex::new(self.creator.lock().unwrap_or_else(PoisonError::into_inner).clone()),
            schedule: Mutex::new(self.async_schedule()),
            function_template: Mutex::new(Weak::new()),
            tables: SideTables::default(),
        })
    }

    // === dispatch ===

    fn caller(ctx: &Context, inv: &Invocation<'_>) -> tether_engine::Result<Value> {
        let Some(template) = ref_payload::<Arc<ObjectTemplate>>(ctx, &inv.data(0)) else {
            return Err(BindError::TemplateCorrupted("template".into()).throw(ctx));
        };
        let holder = ref_payload::<Arc<NativeObject>>(ctx, &inv.data(1));
        template.dispatch(ctx, inv, holder)
    }

    fn dispatch(
        self: &Arc<Self>,
        ctx: &Context,
        inv: &Invocation<'_>,
        holder: Option<Arc<NativeObject>>,
    ) -> tether_engine::Result<Value> {
        let (index, mode) = unmagic(inv.magic);
        let Some(spec) = self.lock_properties().get(index).cloned() else {
            return Err(BindError::TemplateCorrupted(format!("#{index}")).throw(ctx));
        };
        let this_native = NativeObject::from_value(ctx, inv.this);
        if this_native.as_ref().is_some_and(|n| n.is_js_call_disabled()) {
            return Err(BindError::CallDisabled.throw(ctx));
        }
        let callable = match (&spec.kind, mode) {
            (PropertyKind::Function(f), MODE_CALL) => Some(f),
            (PropertyKind::Accessor { getter, .. }, MODE_GET)
            | (PropertyKind::SignalProperty { getter, .. }, MODE_GET) => getter.as_ref(),
            (PropertyKind::Accessor { setter, .. }, MODE_SET)
            | (PropertyKind::SignalProperty { setter, .. }, MODE_SET) => setter.as_ref(),
            (PropertyKind::Async { kind, body }, MODE_CALL) => {
                let Some(native) = this_native.or(holder) else {
                    return Err(ctx.throw_error(ErrorKind::Internal, "async property needs a native object"));
                };
                return self.call_async(ctx, inv, &native, &spec, *kind, Arc::clone(body));
            }
            _ => return Err(BindError::TemplateCorrupted(spec.name.clone()).throw(ctx)),
        };
        let Some(callable) = callable else {
            return Ok(Value::Undefined);
        };
        match callable {
            Callable::Raw(f) => f(ctx, inv.this, inv.args),
            Callable::Info(f) => {
                let mut info = FunctionInfo::new(ctx, inv.this, inv.args, None)
                    .with_holder(holder)
                    .with_object_template(Arc::clone(self), &spec.name);
                f(&mut info);
                Ok(info.take_return()?.unwrap_or_default())
            }
        }
    }

    fn call_async(
        self: &Arc<Self>,
        ctx: &Context,
        inv: &Invocation<'_>,
        native: &Arc<NativeObject>,
        spec: &PropertySpec,
        kind: AsyncKind,
        body: AsyncBody,
    ) -> tether_engine::Result<Value> {
        let Some(executor) = native.get_or_create_async_executor() else {
            return Err(ctx.throw_error(ErrorKind::Internal, "native object has no async executor"));
        };
        let mut info = AsyncInfo::new(native, Arc::clone(self), &spec.name);
        let mut result = Value::Undefined;
        match kind {
            AsyncKind::FireAndForget => {
                if !inv.args.is_empty() {
                    info.set_params(vec![js_to_value_tree(ctx, &inv.arg(0))]);
                }
                let callback = inv.arg(1);
                if ctx.is_function(&callback) {
                    info.set_token(executor.add_callback(ctx, &callback, CallbackKind::Simple));
                }
            }
            AsyncKind::Std => {
                if let Some(hook) = &spec.prepare_callback_id {
                    let token = hook(&mut PrepareInfo { ctx, native, executor: &executor, args: inv.args, info: &mut info });
                    info.set_token(token);
                }
                if info.token().is_none() {
                    if let Some(last) = inv.args.last().filter(|v| ctx.is_function(v)) {
                        info.set_token(executor.add_callback(ctx, last, CallbackKind::Std));
                    }
                }
                if !prepare_params(ctx, native, &executor, inv.args, &mut info, spec) {
                    return Ok(result);
                }
            }
            AsyncKind::Promise => {
                let tip = format!("{}.{}", self.function_name(), spec.name);
                let (token, promise) = executor.create_promise_id(ctx, &tip)?;
                info.set_token(token);
                result = promise;
                if !prepare_params(ctx, native, &executor, inv.args, &mut info, spec) {
                    return Ok(result);
                }
            }
        }
        self.async_schedule().dispatch(self, native, body, info);
        Ok(result)
    }
}

/// Run the prepare-params hook. Returns false when the hook settled the
/// token, which skips the dispatch.
fn prepare_params(
    ctx: &Context,
    native: &Arc<NativeObject>,
    executor: &Arc<AsyncExecutor>,
    args: &[Value],
    info: &mut AsyncInfo,
    spec: &PropertySpec,
) -> bool {
    let mut prepared = false;
    if let Some(hook) = &spec.prepare_params {
        prepared = hook(&mut PrepareInfo { ctx, native, executor, args, info: &mut *info });
        let token = info.token();
        if !token.is_none() && executor.is_settled(token) {
            tracing::debug!("{} settled while preparing, dispatch skipped", spec.name);
            return false;
        }
    }
    if !prepared {
        info.set_params(args_to_params(ctx, args));
    }
    true
}

fn bind_signal(binder: Option<&SignalBinder>, native: Option<&Arc<NativeObject>>, name: &str) {
    if let (Some(binder), Some(native)) = (binder, native) {
        binder(native, name);
    }
}

fn signal_target(ctx: &Context, inv: &Invocation<'_>) -> tether_engine::Result<(Arc<NativeObject>, String)> {
    let template = ref_payload::<Arc<ObjectTemplate>>(ctx, &inv.data(0));
    let native = ref_payload::<Arc<NativeObject>>(ctx, &inv.data(1));
    let (index, _) = unmagic(inv.magic);
    let name = template.and_then(|t| t.lock_properties().get(index).map(|p| p.name.clone()));
    match (native, name) {
        (Some(native), Some(name)) => Ok((native, name)),
        (None, _) => Err(ctx.throw_error(ErrorKind::Internal, "no native object behind this signal")),
        (_, None) => Err(BindError::TemplateCorrupted(format!("#{index}")).throw(ctx)),
    }
}

fn signal_on(ctx: &Context, inv: &Invocation<'_>) -> tether_engine::Result<Value> {
    let (native, name) = signal_target(ctx, inv)?;
    let listener = inv.arg(0);
    if !ctx.is_function(&listener) {
        return Err(ctx.throw_error(ErrorKind::Type, "arg 1 must be function"));
    }
    match native.subscribe_signal(&name, listener) {
        Some(token) => Ok(Value::from(token)),
        None => Err(ctx.throw_error(ErrorKind::Internal, "native object is not attached")),
    }
}

fn signal_off(ctx: &Context, inv: &Invocation<'_>) -> tether_engine::Result<Value> {
    let (native, name) = signal_target(ctx, inv)?;
    let which = match inv.args.first() {
        None => Unsubscribe::All,
        Some(v) if v.is_number() => Unsubscribe::Token(v.as_number().unwrap_or(0.0) as u32),
        Some(v) if ctx.is_function(v) => Unsubscribe::Function(v.clone()),
        Some(_) => return Ok(Value::Undefined),
    };
    native.unsubscribe_signal(&name, which);
    Ok(Value::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvConfig, EnvKind};

    fn env(ctx: &Context) -> Arc<TemplateEnv> {
        TemplateEnv::new(ctx, EnvConfig { name: "device".into(), ..EnvConfig::default() }, EnvKind::Module)
    }

    #[test]
    fn test_plain_template_has_no_native() {
        let ctx = Context::new();
        let tpl = ObjectTemplate::new(&env(&ctx));
        tpl.set_int("answer", 42);
        tpl.set_string("name", "lamp");
        tpl.set_raw_function("double", |_, _, args| Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2)));
        let obj = tpl.new_instance(&ctx).unwrap();
        assert!(NativeObject::from_value(&ctx, &obj).is_none());
        assert_eq!(ctx.get_property(&obj, "answer").unwrap(), Value::Int(42));
        let double = ctx.get_property(&obj, "double").unwrap();
        assert_eq!(ctx.call(&double, &obj, &[Value::Int(4)]).unwrap(), Value::Int(8));
    }

    #[test]
    fn test_redeclare_replaces_in_place() {
        let ctx = Context::new();
        let tpl = ObjectTemplate::new(&env(&ctx));
        tpl.set_int("a", 1);
        tpl.set_int("b", 2);
        assert_eq!(tpl.set_bool("a", true).index(), 0);
        assert_eq!(tpl.properties().len(), 2);
        let obj = tpl.new_instance(&ctx).unwrap();
        assert_eq!(ctx.get_property(&obj, "a").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_accessor_and_info_return() {
        let ctx = Context::new();
        let tpl = ObjectTemplate::new(&env(&ctx));
        tpl.set_accessor(
            "level",
            Some(Callable::info(|info| {
                let native = info.holder().cloned();
                let level = native.and_then(|n| n.field("level")).unwrap_or(Value::Int(0));
                info.return_value().set(level);
            })),
            Some(Callable::info(|info| {
                if let Some(native) = info.holder() {
                    native.set_field("level", info.arg(0));
                }
            })),
        );
        let obj = tpl.new_instance_with(&ctx, true).unwrap();
        assert_eq!(ctx.get_property(&obj, "level").unwrap(), Value::Int(0));
        ctx.set_property(&obj, "level", Value::Int(7)).unwrap();
        assert_eq!(ctx.get_property(&obj, "level").unwrap(), Value::Int(7));
    }

    #[test]
    fn test_call_disabled_throws_without_running() {
        let ctx = Context::new();
        let tpl = ObjectTemplate::new(&env(&ctx));
        tpl.set_function("ping", |info| info.return_value().set("pong"));
        let obj = tpl.new_instance_with(&ctx, true).unwrap();
        let ping = ctx.get_property(&obj, "ping").unwrap();
        assert_eq!(ctx.call(&ping, &obj, &[]).unwrap(), Value::from("pong"));

        NativeObject::from_value(&ctx, &obj).unwrap().set_js_call_disabled(true);
        assert!(ctx.call(&ping, &obj, &[]).is_err());
        let exc = ctx.catch();
        assert_eq!(ctx.describe_exception(&exc), "InternalError: this object js call is disabled");
    }

    #[test]
    fn test_creator_returning_none_fails() {
        let ctx = Context::new();
        let tpl = ObjectTemplate::new(&env(&ctx));
        tpl.set_object_creator(|| None);
        assert_eq!(tpl.new_instance(&ctx), Err(BindError::CreatorReturnedNone));
    }

    #[test]
    fn test_clone_is_deep_for_nested_templates() {
        let ctx = Context::new();
        let env = env(&ctx);
        let inner = ObjectTemplate::new(&env);
        inner.set_int("x", 1);
        let outer = ObjectTemplate::new(&env);
        outer.set_object_template("inner", Arc::clone(&inner));

        let copy = outer.clone_template();
        inner.set_int("x", 2);
        let obj = copy.new_instance(&ctx).unwrap();
        let nested = ctx.get_property(&obj, "inner").unwrap();
        assert_eq!(ctx.get_property(&nested, "x").unwrap(), Value::Int(1));
    }
}
