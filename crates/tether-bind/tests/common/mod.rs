//! Shared test helpers

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tether_bind::{EnvConfig, EnvKind, TemplateEnv};
use tether_bind::engine::{Context, Value};

pub const WAIT: Duration = Duration::from_secs(5);

/// Install a test subscriber; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn module_env(ctx: &Context, name: &str) -> Arc<TemplateEnv> {
    TemplateEnv::new(ctx, EnvConfig { name: name.into(), ..EnvConfig::default() }, EnvKind::Module)
}

/// Script function recording the arguments of every call
pub fn recorder(ctx: &Context) -> (Value, Rc<RefCell<Vec<Vec<Value>>>>) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);
    let func = ctx.new_function("recorder", 0, 0, Vec::new(), move |_, inv| {
        sink.borrow_mut().push(inv.args.to_vec());
        Ok(Value::Undefined)
    });
    (func, calls)
}

/// Call `obj[name](...args)`
pub fn call_method(ctx: &Context, obj: &Value, name: &str, args: &[Value]) -> tether_bind::engine::Result<Value> {
    let method = ctx.get_property(obj, name)?;
    ctx.call(&method, obj, args)
}
