//! Template property declarations

use std::sync::Arc;

use tether_engine::{Context, PropertyFlags, Value};

use crate::executor::Token;
use crate::function_template::FunctionTemplate;
use crate::info::{AsyncInfo, FunctionInfo, PrepareInfo};
use crate::native::NativeObject;
use crate::object_template::ObjectTemplate;

/// Callback taking a full call context
pub type FunctionCallback = Arc<dyn Fn(&mut FunctionInfo<'_>) + Send + Sync>;

/// Plain native function: `(ctx, this, args) -> result`
pub type RawFunction = Arc<dyn Fn(&Context, &Value, &[Value]) -> tether_engine::Result<Value> + Send + Sync>;

/// Body of an async property, run on a worker thread
pub type AsyncBody = Arc<dyn Fn(&AsyncInfo) + Send + Sync>;

/// Supplies the callback token of a std async call
pub type PrepareCallbackIdHook = Arc<dyn for<'a, 'b> Fn(&mut PrepareInfo<'a, 'b>) -> Token + Send + Sync>;

/// Builds the parameters of an async call. Returns true when it set them.
pub type PrepareParamsHook = Arc<dyn for<'a, 'b> Fn(&mut PrepareInfo<'a, 'b>) -> bool + Send + Sync>;

/// Wires a native object's own notifications into a signal property
pub type SignalBinder = Arc<dyn Fn(&Arc<NativeObject>, &str) + Send + Sync>;

/// A native function in one of two calling styles
#[derive(Clone)]
pub enum Callable {
    Raw(RawFunction),
    Info(FunctionCallback),
}

impl Callable {
    pub fn raw<F>(f: F) -> Self
    where
        F: Fn(&Context, &Value, &[Value]) -> tether_engine::Result<Value> + Send + Sync + 'static,
    {
        Callable::Raw(Arc::new(f))
    }

    pub fn info<F>(f: F) -> Self
    where
        F: Fn(&mut FunctionInfo<'_>) + Send + Sync + 'static,
    {
        Callable::Info(Arc::new(f))
    }
}

/// Delivery style of an async property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    /// `obj.f(params, cb?)`, `cb(result)`
    FireAndForget,
    /// `obj.f(...args, cb)`, `cb(err, result)`
    Std,
    /// `obj.f(...args)` returns a promise
    Promise,
}

/// What a property is
#[derive(Clone)]
pub enum PropertyKind {
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Double(f64),
    String(String),
    Function(Callable),
    Accessor { getter: Option<Callable>, setter: Option<Callable> },
    AccessorTemplate { getter: Arc<FunctionTemplate>, setter: Option<Arc<FunctionTemplate>> },
    FunctionTemplate(Arc<FunctionTemplate>),
    ObjectTemplate(Arc<ObjectTemplate>),
    /// Sub-object with `on`/`off`
    Signal { binder: Option<SignalBinder> },
    /// Sub-object with `on`/`off` and a `value` accessor
    SignalProperty { binder: Option<SignalBinder>, getter: Option<Callable>, setter: Option<Callable> },
    Async { kind: AsyncKind, body: AsyncBody },
}

impl PropertyKind {
    pub fn is_async(&self) -> bool {
        matches!(self, PropertyKind::Async { .. })
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            PropertyKind::Bool(_) => "bool",
            PropertyKind::Int32(_) => "int32",
            PropertyKind::Uint32(_) => "uint32",
            PropertyKind::Double(_) => "double",
            PropertyKind::String(_) => "string",
            PropertyKind::Function(_) => "function",
            PropertyKind::Accessor { .. } => "accessor",
            PropertyKind::AccessorTemplate { .. } => "accessor template",
            PropertyKind::FunctionTemplate(_) => "function template",
            PropertyKind::ObjectTemplate(_) => "object template",
            PropertyKind::Signal { .. } => "signal",
            PropertyKind::SignalProperty { .. } => "signal property",
            PropertyKind::Async { .. } => "async",
        }
    }
}

/// One declared property
#[derive(Clone)]
pub struct PropertySpec {
    pub name: String,
    pub kind: PropertyKind,
    pub flags: PropertyFlags,
    pub prepare_callback_id: Option<PrepareCallbackIdHook>,
    pub prepare_params: Option<PrepareParamsHook>,
}

impl PropertySpec {
    pub fn new(name: &str, kind: PropertyKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            flags: PropertyFlags::ALL,
            prepare_callback_id: None,
            prepare_params: None,
        }
    }
}

impl std::fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Returned by template setters to refine the declared property
pub struct PropertyHandle<'a> {
    pub(crate) template: &'a ObjectTemplate,
    pub(crate) index: usize,
}

impl PropertyHandle<'_> {
    pub fn flags(self, flags: PropertyFlags) -> Self {
        self.template.update_property(self.index, |spec| spec.flags = flags);
        self
    }

    pub fn prepare_callback_id<F>(self, hook: F) -> Self
    where
        F: for<'a, 'b> Fn(&mut PrepareInfo<'a, 'b>) -> Token + Send + Sync + 'static,
    {
        let hook: PrepareCallbackIdHook = Arc::new(hook);
        self.template.update_property(self.index, |spec| spec.prepare_callback_id = Some(hook));
        self
    }

    pub fn prepare_params<F>(self, hook: F) -> Self
    where
        F: for<'a, 'b> Fn(&mut PrepareInfo<'a, 'b>) -> bool + Send + Sync + 'static,
    {
        let hook: PrepareParamsHook = Arc::new(hook);
        self.template.update_property(self.index, |spec| spec.prepare_params = Some(hook));
        self
    }

    /// Position of the property in declaration order
    pub fn index(&self) -> usize {
        self.index
    }
}
