//! Iterator methods
//!
//! [`set_iterator_method`] installs `obj[name]()` returning a fresh
//! iterator object whose `next()` yields `{ value, done }`. The producer
//! is kept in the owner's native ref fields, so it lives exactly as long as
//! the owner does.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tether_engine::{Context, ErrorKind, Invocation, Marker, PropertyFlags, Value};

use crate::error::{BindError, Result};
use crate::native::{NativeHooks, NativeObject};
use crate::refs::{new_ref, ref_payload};

/// Produces item `index` of `target`, or None when exhausted
pub type IterNextFn = Arc<dyn Fn(&Context, &Value, usize) -> tether_engine::Result<Option<Value>> + Send + Sync>;

static NEXT_KEY: AtomicUsize = AtomicUsize::new(0);

struct IterMethod {
    next: IterNextFn,
}

/// One live iteration
struct IterState {
    target: Value,
    next: IterNextFn,
    index: AtomicUsize,
    done: AtomicBool,
}

impl NativeHooks for IterState {
    fn on_gc_mark(&self, _obj: &NativeObject, marker: &mut Marker) {
        marker.mark(&self.target);
    }
}

/// Install `target[name]()` as an iterator factory.
///
/// `target` must be backed by a native object created from a template.
pub fn set_iterator_method<F>(ctx: &Context, target: &Value, name: &str, next: F) -> Result<()>
where
    F: Fn(&Context, &Value, usize) -> tether_engine::Result<Option<Value>> + Send + Sync + 'static,
{
    let native = NativeObject::from_value(ctx, target).ok_or(BindError::NotNativeObject)?;
    let key = format!("iter.{}", NEXT_KEY.fetch_add(1, Ordering::Relaxed));
    if !native.set_ref_field(&key, Arc::new(IterMethod { next: Arc::new(next) })) {
        return Err(BindError::NotNativeObject);
    }
    let data = vec![new_ref(ctx, native), Value::from(key)];
    let method = ctx.new_function(name, 0, 0, data, make_iterator);
    ctx.define_property_value(target, name, method, PropertyFlags::WRITABLE | PropertyFlags::CONFIGURABLE)?;
    Ok(())
}

fn make_iterator(ctx: &Context, inv: &Invocation<'_>) -> tether_engine::Result<Value> {
    let owner = ref_payload::<Arc<NativeObject>>(ctx, &inv.data(0));
    let key = inv.data(1);
    let method = owner
        .as_ref()
        .zip(key.as_str())
        .and_then(|(owner, key)| owner.ref_field_as::<IterMethod>(key));
    let (Some(owner), Some(method)) = (owner, method) else {
        return Err(ctx.throw_error(ErrorKind::Internal, "iterator method is gone"));
    };
    let Some(target) = owner.js_value() else {
        return Err(ctx.throw_error(ErrorKind::Internal, "iterator owner is detached"));
    };
    let state = NativeObject::new(IterState {
        target,
        next: Arc::clone(&method.next),
        index: AtomicUsize::new(0),
        done: AtomicBool::new(false),
    });
    let iterator = state.attach(ctx).map_err(|e| e.throw(ctx))?;
    let next = ctx.new_function("next", 0, 0, vec![new_ref(ctx, state)], iterator_next);
    ctx.define_property_value(&iterator, "next", next, PropertyFlags::WRITABLE | PropertyFlags::CONFIGURABLE)?;
    Ok(iterator)
}

fn iterator_next(ctx: &Context, inv: &Invocation<'_>) -> tether_engine::Result<Value> {
    let state = ref_payload::<Arc<NativeObject>>(ctx, &inv.data(0)).and_then(|n| n.hooks::<IterState>());
    let Some(state) = state else {
        return Err(ctx.throw_error(ErrorKind::Internal, "iterator state is gone"));
    };
    let item = if state.done.load(Ordering::Acquire) {
        None
    } else {
        let index = state.index.fetch_add(1, Ordering::AcqRel);
        (state.next)(ctx, &state.target, index)?
    };
    let result = ctx.new_object();
    let done = item.is_none();
    if done {
        state.done.store(true, Ordering::Release);
    }
    ctx.set_property(&result, "value", item.unwrap_or_default())?;
    ctx.set_property(&result, "done", Value::Bool(done))?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvConfig, EnvKind, TemplateEnv};
    use crate::object_template::ObjectTemplate;

    fn next(ctx: &Context, iterator: &Value) -> (Value, bool) {
        let next = ctx.get_property(iterator, "next").unwrap();
        let step = ctx.call(&next, iterator, &[]).unwrap();
        let done = ctx.get_property(&step, "done").unwrap() == Value::Bool(true);
        (ctx.get_property(&step, "value").unwrap(), done)
    }

    #[test]
    fn test_iterator_runs_to_done_and_stays_done() {
        let ctx = Context::new();
        let env = TemplateEnv::new(&ctx, EnvConfig::default(), EnvKind::Module);
        let tpl = ObjectTemplate::new(&env);
        let obj = tpl.new_instance_with(&ctx, true).unwrap();
        set_iterator_method(&ctx, &obj, "values", |_, _, i| Ok((i < 2).then(|| Value::Int(i as i32 * 10)))).unwrap();

        let values = ctx.get_property(&obj, "values").unwrap();
        let it = ctx.call(&values, &obj, &[]).unwrap();
        assert_eq!(next(&ctx, &it), (Value::Int(0), false));
        assert_eq!(next(&ctx, &it), (Value::Int(10), false));
        assert_eq!(next(&ctx, &it), (Value::Undefined, true));
        assert_eq!(next(&ctx, &it), (Value::Undefined, true));
    }

    #[test]
    fn test_plain_object_is_rejected() {
        let ctx = Context::new();
        let obj = ctx.new_object();
        let err = set_iterator_method(&ctx, &obj, "values", |_, _, _| Ok(None));
        assert_eq!(err, Err(BindError::NotNativeObject));
    }
}
