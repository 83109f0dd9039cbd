//! Topic publisher objects
//!
//! A [`PublishObject`] gives script code `on(topic, fn)` and `off(...)`,
//! and gives native code [`PublishObject::publish`] from any thread.

use std::sync::{Arc, Mutex, PoisonError};

use tether_engine::{Context, Marker, Value};
use tether_value::ValueTree;

use crate::convert::{json_to_js, value_tree_to_js};
use crate::info::FunctionInfo;
use crate::native::{NativeHooks, NativeObject};
use crate::object_template::ObjectTemplate;
use crate::side_table::{SignalRegistry, Unsubscribe};

/// Where `publish` runs the listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Synchronously on the engine thread, posted from anywhere else
    #[default]
    Auto,
    /// Synchronously; dropped off the engine thread
    Sync,
    /// Always posted to the engine thread
    Async,
}

#[derive(Default)]
pub struct PublishObject {
    topics: Mutex<SignalRegistry>,
}

impl NativeHooks for PublishObject {
    fn on_init(&self, obj: &NativeObject, _ctx: &Context) {
        obj.hook_gc_mark(Arc::new(|obj: &NativeObject, marker: &mut Marker| {
            if let Some(publisher) = obj.hooks::<PublishObject>() {
                publisher.lock().mark(marker);
            }
        }));
        obj.hook_gc_collect(Box::new(|obj: &NativeObject, _ctx: &Context| {
            if let Some(publisher) = obj.hooks::<PublishObject>() {
                let listeners = publisher.lock().clear();
                tracing::trace!("publisher {} collected with {} listeners", obj.id(), listeners.len());
            }
        }));
    }
}

impl PublishObject {
    fn lock(&self) -> std::sync::MutexGuard<'_, SignalRegistry> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `template` build publisher objects with `on` and `off`
    pub fn init_template(template: &ObjectTemplate) {
        template.set_object_creator(|| Some(NativeObject::new(PublishObject::default())));
        template.set_function("on", on);
        template.set_function("off", off);
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.lock().count(topic)
    }

    /// Deliver `data` to the listeners of `topic`. False when nothing could
    /// be delivered or posted.
    pub fn publish(obj: &Arc<NativeObject>, topic: &str, data: ValueTree, mode: PublishMode) -> bool {
        Self::dispatch(obj, topic, mode, move |ctx| value_tree_to_js(ctx, &data))
    }

    /// Like [`publish`](Self::publish) with JSON text. Unparsable text is
    /// logged and its exception value is delivered instead.
    pub fn publish_json(obj: &Arc<NativeObject>, topic: &str, json: String, mode: PublishMode) -> bool {
        Self::dispatch(obj, topic, mode, move |ctx| match json_to_js(ctx, &json) {
            Ok(value) => value,
            Err(_) => {
                let exception = ctx.catch();
                ctx.dump_error(&exception);
                exception
            }
        })
    }

    fn dispatch<F>(obj: &Arc<NativeObject>, topic: &str, mode: PublishMode, make: F) -> bool
    where
        F: FnOnce(&Context) -> Value + Send + 'static,
    {
        let Some(handler) = obj.handler() else {
            tracing::debug!("publisher {} has no engine, {} dropped", obj.id(), topic);
            return false;
        };
        let sync = match mode {
            PublishMode::Auto => handler.is_engine_thread(),
            PublishMode::Sync => true,
            PublishMode::Async => false,
        };
        if sync {
            let delivered = handler.with_context(|ctx| deliver(ctx, obj, topic, make(ctx)));
            if delivered.is_none() {
                tracing::warn!("sync publish of {} off the engine thread dropped", topic);
            }
            return delivered.is_some();
        }
        let obj = Arc::clone(obj);
        let topic = topic.to_string();
        handler.post(move |ctx| {
            let value = make(ctx);
            deliver(ctx, &obj, &topic, value);
        })
    }
}

fn deliver(ctx: &Context, obj: &NativeObject, topic: &str, value: Value) -> usize {
    let Some(publisher) = obj.hooks::<PublishObject>() else {
        return 0;
    };
    let listeners = publisher.lock().listeners(topic);
    let this = obj.js_value().unwrap_or_default();
    for listener in &listeners {
        if ctx.call(listener, &this, std::slice::from_ref(&value)).is_err() {
            tracing::warn!("listener of {} threw", topic);
            ctx.dump_pending();
        }
    }
    listeners.len()
}

fn publisher_of(info: &mut FunctionInfo<'_>) -> Option<Arc<PublishObject>> {
    let publisher = info.this_native().and_then(|n| n.hooks::<PublishObject>());
    if publisher.is_none() {
        info.return_value().throw_type_error("not a publish object");
    }
    publisher
}

fn on(info: &mut FunctionInfo<'_>) {
    let Some(publisher) = publisher_of(info) else {
        return;
    };
    let ctx = info.context();
    let topic = info.arg(0);
    let Some(topic) = topic.as_str() else {
        info.return_value().throw_type_error("arg0 should be topic as string type");
        return;
    };
    let listener = info.arg(1);
    if !ctx.is_function(&listener) {
        info.return_value().throw_type_error("arg1 should be callback as function type");
        return;
    }
    let token = publisher.lock().subscribe(topic, listener);
    info.return_value().set(token);
}

fn off(info: &mut FunctionInfo<'_>) {
    let Some(publisher) = publisher_of(info) else {
        return;
    };
    let ctx = info.context();
    let first = info.arg(0);
    let second = info.arg(1);
    let mut topics = publisher.lock();
    match first.as_str() {
        None if info.is_empty() => drop(topics.clear()),
        None if first.is_number() => drop(topics.remove_token(first.as_number().unwrap_or(0.0) as u32)),
        None => tracing::debug!("off: unsupported arguments"),
        Some(topic) => {
            let which = if second.is_number() {
                Unsubscribe::Token(second.as_number().unwrap_or(0.0) as u32)
            } else if ctx.is_function(&second) {
                Unsubscribe::Function(second.clone())
            } else {
                Unsubscribe::All
            };
            drop(topics.unsubscribe(topic, &which));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvConfig, EnvKind, TemplateEnv};

    #[test]
    fn test_on_rejects_bad_arguments() {
        let ctx = Context::new();
        let env = TemplateEnv::new(&ctx, EnvConfig::default(), EnvKind::Module);
        let tpl = ObjectTemplate::new(&env);
        PublishObject::init_template(&tpl);
        let obj = tpl.new_instance(&ctx).unwrap();
        let on = ctx.get_property(&obj, "on").unwrap();

        assert!(ctx.call(&on, &obj, &[Value::Int(1)]).is_err());
        let exc = ctx.catch();
        assert_eq!(ctx.describe_exception(&exc), "TypeError: arg0 should be topic as string type");

        assert!(ctx.call(&on, &obj, &[Value::from("tick"), Value::Int(1)]).is_err());
        let exc = ctx.catch();
        assert_eq!(ctx.describe_exception(&exc), "TypeError: arg1 should be callback as function type");
    }
}
