//! Constructor templates
//!
//! A [`FunctionTemplate`] produces a script constructor. Its instance
//! template shapes the objects `new` creates; its prototype template shapes
//! the shared prototype those objects inherit from.

use std::sync::{Arc, Mutex, PoisonError};

use tether_engine::{Context, ErrorKind, Invocation, Value};

use crate::env::TemplateEnv;
use crate::info::FunctionInfo;
use crate::native::NativeObject;
use crate::object_template::ObjectTemplate;
use crate::property::FunctionCallback;
use crate::refs::{new_ref, ref_payload};
use crate::schedule::ScheduleInfo;

const DEFAULT_NAME: &str = "FunctionTemplate";

pub struct FunctionTemplate {
    env: Arc<TemplateEnv>,
    name: Mutex<String>,
    callback: Mutex<Option<FunctionCallback>>,
    instance: Mutex<Option<Arc<ObjectTemplate>>>,
    prototype: Mutex<Option<Arc<ObjectTemplate>>>,
}

impl std::fmt::Debug for FunctionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTemplate").field("name", &self.name()).finish()
    }
}

impl FunctionTemplate {
    pub fn new(env: &Arc<TemplateEnv>, name: &str) -> Arc<Self> {
        Arc::new(Self {
            env: Arc::clone(env),
            name: Mutex::new(name.to_string()),
            callback: Mutex::new(None),
            instance: Mutex::new(None),
            prototype: Mutex::new(None),
        })
    }

    pub fn env(&self) -> &Arc<TemplateEnv> {
        &self.env
    }

    /// Class name; empty names fall back to `FunctionTemplate`
    pub fn name(&self) -> String {
        let name = self.name.lock().unwrap_or_else(PoisonError::into_inner);
        if name.is_empty() { DEFAULT_NAME.to_string() } else { name.clone() }
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }

    /// Body run on every call. Its return value replaces the constructed
    /// instance.
    pub fn set_callback<F>(&self, f: F)
    where
        F: Fn(&mut FunctionInfo<'_>) + Send + Sync + 'static,
    {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    fn lazy_template(self: &Arc<Self>, slot: &Mutex<Option<Arc<ObjectTemplate>>>) -> Arc<ObjectTemplate> {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slot.get_or_insert_with(|| {
            let template = ObjectTemplate::new(&self.env);
            template.set_owner(self);
            template
        }))
    }

    /// Shape of the objects `new` creates
    pub fn instance_template(self: &Arc<Self>) -> Arc<ObjectTemplate> {
        self.lazy_template(&self.instance)
    }

    /// Shape of the shared prototype
    pub fn prototype_template(self: &Arc<Self>) -> Arc<ObjectTemplate> {
        self.lazy_template(&self.prototype)
    }

    fn existing_prototype(&self) -> Option<Arc<ObjectTemplate>> {
        self.prototype.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn existing_instance(&self) -> Option<Arc<ObjectTemplate>> {
        self.instance.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Shorthand for a method on the prototype template
    pub fn set_proto_method<F>(self: &Arc<Self>, name: &str, f: F)
    where
        F: Fn(&mut FunctionInfo<'_>) + Send + Sync + 'static,
    {
        self.prototype_template().set_function(name, f);
    }

    pub fn set_async_schedule_mode(self: &Arc<Self>, mode: u32) {
        self.instance_template().set_async_schedule_mode(mode);
        self.prototype_template().set_async_schedule_mode(mode);
    }

    pub fn set_async_schedule_hook<F>(self: &Arc<Self>, hook: F)
    where
        F: Fn(&mut ScheduleInfo<'_>) + Send + Sync + 'static,
    {
        let hook = Arc::new(hook);
        let for_instance = Arc::clone(&hook);
        self.instance_template().set_async_schedule_hook(move |info| for_instance(info));
        self.prototype_template().set_async_schedule_hook(move |info| hook(info));
    }

    /// Build the script constructor
    pub fn get_function(self: &Arc<Self>, ctx: &Context) -> tether_engine::Result<Value> {
        let name = self.name();
        let data = vec![new_ref(ctx, Arc::clone(self))];
        let func = ctx.new_function(&name, 0, 0, data, Self::constructor);
        let proto = match self.existing_prototype() {
            Some(template) => template
                .new_instance(ctx)
                .map_err(|e| e.throw(ctx))?,
            None => ctx.new_object(),
        };
        ctx.set_constructor(&func, &proto)?;
        Ok(func)
    }

    fn constructor(ctx: &Context, inv: &Invocation<'_>) -> tether_engine::Result<Value> {
        let Some(template) = ref_payload::<Arc<FunctionTemplate>>(ctx, &inv.data(0)) else {
            return Err(ctx.throw_error(ErrorKind::Internal, "cannot get function template"));
        };
        template.construct(ctx, inv)
    }

    fn construct(self: &Arc<Self>, ctx: &Context, inv: &Invocation<'_>) -> tether_engine::Result<Value> {
        let prototype = self.existing_prototype();
        let Some(new_target) = inv.new_target else {
            if prototype.is_some() {
                let msg = format!("{} prototype function should create instance by new operator", self.name());
                return Err(ctx.throw_error(ErrorKind::Internal, &msg));
            }
            return self.run_callback(ctx, inv.this, inv.args, None, None);
        };
        let proto = ctx.get_property(new_target, "prototype")?;
        if !proto.is_object() {
            return Err(ctx.throw_error(ErrorKind::Type, "prototype is deformed"));
        }
        let force_native = prototype.is_some_and(|p| p.has_async_property());
        let (instance, native) = match self.existing_instance() {
            Some(template) => {
                let (object, native) = template.create_object(ctx, force_native).map_err(|e| e.throw(ctx))?;
                ctx.set_prototype(&object, &proto)?;
                template.inject(ctx, &object, native.as_ref()).map_err(|e| e.throw(ctx))?;
                (object, native)
            }
            None if force_native => {
                let native = NativeObject::base();
                native.set_template(&self.prototype_template());
                let object = native.attach(ctx).map_err(|e| e.throw(ctx))?;
                ctx.set_prototype(&object, &proto)?;
                (object, Some(native))
            }
            None => (ctx.new_object_with_proto(&proto)?, None),
        };
        self.run_callback(ctx, &instance, inv.args, Some(new_target), native)
    }

    fn run_callback(
        self: &Arc<Self>,
        ctx: &Context,
        this: &Value,
        args: &[Value],
        new_target: Option<&Value>,
        native: Option<Arc<NativeObject>>,
    ) -> tether_engine::Result<Value> {
        let callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let mut info = FunctionInfo::new(ctx, this, args, new_target)
            .with_holder(native.clone())
            .with_function_template(Arc::clone(self));
        if let Some(callback) = &callback {
            callback(&mut info);
        }
        if let Some(native) = &native {
            native.on_ctor(&mut info);
        }
        let returned = info.take_return()?;
        Ok(match returned {
            Some(value) => value,
            None if new_target.is_some() => this.clone(),
            None => Value::Undefined,
        })
    }

    /// Independent copy including its instance and prototype templates
    pub fn clone_template(&self) -> Arc<FunctionTemplate> {
        let copy = Arc::new(Self {
            env: Arc::clone(&self.env),
            name: Mutex::new(self.name.lock().unwrap_or_else(PoisonError::into_inner).clone()),
            callback: Mutex::new(self.callback.lock().unwrap_or_else(PoisonError::into_inner).clone()),
            instance: Mutex::new(None),
            prototype: Mutex::new(None),
        });
        for (source, slot) in [(self.existing_instance(), &copy.instance), (self.existing_prototype(), &copy.prototype)] {
            if let Some(source) = source {
                let template = source.clone_template();
                template.set_owner(&copy);
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(template);
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvConfig, EnvKind};

    fn env(ctx: &Context) -> Arc<TemplateEnv> {
        TemplateEnv::new(ctx, EnvConfig { name: "shapes".into(), ..EnvConfig::default() }, EnvKind::Module)
    }

    #[test]
    fn test_constructor_links_prototype() {
        let ctx = Context::new();
        let tpl = FunctionTemplate::new(&env(&ctx), "Point");
        tpl.instance_template().set_int("x", 3);
        tpl.set_proto_method("norm", |info| {
            let this = info.this().clone();
            let x = info.context().get_property(&this, "x").unwrap_or_default();
            info.return_value().set(x);
        });
        let ctor = tpl.get_function(&ctx).unwrap();
        let point = ctx.call_constructor(&ctor, &[]).unwrap();
        let norm = ctx.get_property(&point, "norm").unwrap();
        assert_eq!(ctx.call(&norm, &point, &[]).unwrap(), Value::Int(3));
        assert_eq!(tpl.instance_template().function_name(), "Point");
    }

    #[test]
    fn test_plain_call_with_prototype_throws() {
        let ctx = Context::new();
        let tpl = FunctionTemplate::new(&env(&ctx), "Point");
        tpl.set_proto_method("norm", |_| {});
        let ctor = tpl.get_function(&ctx).unwrap();
        assert!(ctx.call(&ctor, &Value::Undefined, &[]).is_err());
        let exc = ctx.catch();
        assert_eq!(
            ctx.describe_exception(&exc),
            "InternalError: Point prototype function should create instance by new operator"
        );
    }

    #[test]
    fn test_deformed_new_target_prototype() {
        let ctx = Context::new();
        let tpl = FunctionTemplate::new(&env(&ctx), "Point");
        let ctor = tpl.get_function(&ctx).unwrap();
        let target = ctx.new_object();
        ctx.set_property(&target, "prototype", Value::Int(1)).unwrap();
        assert!(ctx.call_constructor_with_target(&ctor, &target, &[]).is_err());
        let exc = ctx.catch();
        assert_eq!(ctx.describe_exception(&exc), "TypeError: prototype is deformed");
    }

    #[test]
    fn test_callback_return_replaces_instance() {
        let ctx = Context::new();
        let tpl = FunctionTemplate::new(&env(&ctx), "");
        assert_eq!(tpl.name(), "FunctionTemplate");
        tpl.set_callback(|info| info.return_value().set(5));
        let ctor = tpl.get_function(&ctx).unwrap();
        assert_eq!(ctx.call_constructor(&ctor, &[]).unwrap(), Value::Int(5));
        assert_eq!(ctx.call(&ctor, &Value::Undefined, &[]).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_async_prototype_forces_native() {
        let ctx = Context::new();
        let tpl = FunctionTemplate::new(&env(&ctx), "Lamp");
        tpl.prototype_template().set_async("toggle", |_| {});
        let ctor = tpl.get_function(&ctx).unwrap();
        let lamp = ctx.call_constructor(&ctor, &[]).unwrap();
        assert!(NativeObject::from_value(&ctx, &lamp).is_some());
    }
}
