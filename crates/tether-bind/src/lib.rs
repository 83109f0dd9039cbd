//! tether binding layer
//!
//! Exposes native Rust objects to the tether engine:
//!
//! - [`NativeObject`]: the native half of a script object, attached once
//!   and detached when the engine finalizes it
//! - [`ObjectTemplate`] / [`FunctionTemplate`]: declared shapes stamped
//!   onto new objects and constructors
//! - [`AsyncExecutor`]: tokens for pending script callbacks and promises,
//!   settled from any thread
//! - [`AsyncSchedule`]: routing of async bodies onto named worker threads
//!
//! Per-instance state lives in side tables on the template rather than in
//! script-visible properties. Script values held natively are either pinned
//! or reported to the collector through the object's mark hook.
//!
//! ```ignore
//! let env = TemplateEnv::new(&ctx, EnvConfig { name: "net".into(), ..Default::default() }, EnvKind::Module);
//! let tpl = ObjectTemplate::new(&env);
//! tpl.set_async_std("fetch", |info| info.post(format!("got {}", info.param(0).string_value())));
//! env.export_object_template(&ctx, "client", tpl)?;
//! ```

mod convert;
mod env;
mod error;
mod executor;
mod function_template;
mod info;
mod iter;
mod native;
mod object_template;
mod property;
mod publish;
mod refs;
mod schedule;
mod side_table;

pub use convert::{args_to_params, js_to_value_tree, json_to_js, value_tree_to_js};
pub use env::{EnvConfig, EnvKind, TemplateEnv};
pub use error::{BindError, ErrorDesc, Result};
pub use executor::{AsyncExecutor, CallbackKind, Token};
pub use function_template::FunctionTemplate;
pub use info::{AsyncData, AsyncInfo, FunctionInfo, JsThreadInfo, PrepareInfo, ReturnValue};
pub use iter::{set_iterator_method, IterNextFn};
pub use native::{NativeHooks, NativeObject};
pub use object_template::{ObjectCreator, ObjectTemplate};
pub use property::{
    AsyncBody, AsyncKind, Callable, FunctionCallback, PrepareCallbackIdHook, PrepareParamsHook,
    PropertyHandle, PropertyKind, PropertySpec, RawFunction, SignalBinder,
};
pub use publish::{PublishMode, PublishObject};
pub use schedule::{
    AsyncSchedule, ScheduleConfig, ScheduleHook, ScheduleInfo, ScheduleTarget, MODE_APP,
    MODE_FUNCTION, MODE_MODULE, MODE_OBJECT,
};
pub use side_table::{
    GcCollectHook, GcHookRegistry, GcMarkHook, RefFields, RefValue, SideTable, SideTables,
    SignalRegistry, Unsubscribe, ValueFields,
};

pub use tether_engine as engine;
pub use tether_value::ValueTree;
