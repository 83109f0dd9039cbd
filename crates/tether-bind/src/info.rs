//! Call contexts handed to native callbacks

use std::any::Any;
use std::sync::{Arc, Weak};

use tether_engine::{Context, ErrorKind, Value};
use tether_value::ValueTree;

use crate::convert::{args_to_params, js_to_value_tree};
use crate::env::TemplateEnv;
use crate::error::ErrorDesc;
use crate::executor::{AsyncExecutor, CallbackKind, Token};
use crate::function_template::FunctionTemplate;
use crate::native::NativeObject;
use crate::object_template::ObjectTemplate;

/// Opaque per-call payload carried by [`AsyncInfo`]
pub type AsyncData = Arc<dyn Any + Send + Sync>;

/// Return slot of a native call
///
/// Unset means the caller's default result. The `throw_*` helpers make the
/// call raise a script exception instead.
pub struct ReturnValue<'a> {
    ctx: &'a Context,
    value: Option<Value>,
    exception: bool,
}

impl<'a> ReturnValue<'a> {
    pub(crate) fn new(ctx: &'a Context) -> Self {
        Self { ctx, value: None, exception: false }
    }

    pub fn set(&mut self, value: impl Into<Value>) {
        self.value = Some(value.into());
        self.exception = false;
    }

    pub fn set_undefined(&mut self) {
        self.set(Value::Undefined);
    }

    /// The value set so far, or undefined
    pub fn get(&self) -> Value {
        self.value.clone().unwrap_or_default()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some() || self.exception
    }

    pub fn is_exception(&self) -> bool {
        self.exception
    }

    /// Throw an arbitrary value
    pub fn throw(&mut self, value: Value) {
        let _ = self.ctx.throw(value);
        self.value = None;
        self.exception = true;
    }

    pub fn throw_error(&mut self, kind: ErrorKind, message: &str) {
        let _ = self.ctx.throw_error(kind, message);
        self.value = None;
        self.exception = true;
    }

    pub fn throw_syntax_error(&mut self, message: &str) {
        self.throw_error(ErrorKind::Syntax, message);
    }

    pub fn throw_type_error(&mut self, message: &str) {
        self.throw_error(ErrorKind::Type, message);
    }

    pub fn throw_reference_error(&mut self, message: &str) {
        self.throw_error(ErrorKind::Reference, message);
    }

    pub fn throw_range_error(&mut self, message: &str) {
        self.throw_error(ErrorKind::Range, message);
    }

    pub fn throw_internal_error(&mut self, message: &str) {
        self.throw_error(ErrorKind::Internal, message);
    }

    pub fn throw_out_of_memory(&mut self) {
        self.throw_error(ErrorKind::OutOfMemory, "out of memory");
    }

    /// `Ok(None)` when nothing was set
    pub(crate) fn into_result(self) -> tether_engine::Result<Option<Value>> {
        if self.exception {
            return Err(tether_engine::Error::Exception);
        }
        Ok(self.value)
    }
}

/// Synchronous call context of a template function, accessor or constructor
pub struct FunctionInfo<'a> {
    ctx: &'a Context,
    this: &'a Value,
    args: &'a [Value],
    new_target: Option<&'a Value>,
    holder: Option<Arc<NativeObject>>,
    object_template: Option<Arc<ObjectTemplate>>,
    function_template: Option<Arc<FunctionTemplate>>,
    property: String,
    ret: ReturnValue<'a>,
}

impl<'a> FunctionInfo<'a> {
    pub(crate) fn new(
        ctx: &'a Context,
        this: &'a Value,
        args: &'a [Value],
        new_target: Option<&'a Value>,
    ) -> Self {
        Self {
            ctx,
            this,
            args,
            new_target,
            holder: None,
            object_template: None,
            function_template: None,
            property: String::new(),
            ret: ReturnValue::new(ctx),
        }
    }

    pub(crate) fn with_holder(mut self, holder: Option<Arc<NativeObject>>) -> Self {
        self.holder = holder;
        self
    }

    pub(crate) fn with_object_template(mut self, template: Arc<ObjectTemplate>, property: &str) -> Self {
        self.object_template = Some(template);
        self.property = property.to_string();
        self
    }

    pub(crate) fn with_function_template(mut self, template: Arc<FunctionTemplate>) -> Self {
        self.function_template = Some(template);
        self
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument at `index`, or undefined
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    pub fn this(&self) -> &'a Value {
        self.this
    }

    /// Native object behind `this`
    pub fn this_native(&self) -> Option<Arc<NativeObject>> {
        NativeObject::from_value(self.ctx, self.this)
    }

    /// Native object the function was bound to at injection
    pub fn holder(&self) -> Option<&Arc<NativeObject>> {
        self.holder.as_ref()
    }

    pub fn new_target(&self) -> Option<&'a Value> {
        self.new_target
    }

    pub fn is_constructor_call(&self) -> bool {
        self.new_target.is_some()
    }

    pub fn object_template(&self) -> Option<&Arc<ObjectTemplate>> {
        self.object_template.as_ref()
    }

    pub fn function_template(&self) -> Option<&Arc<FunctionTemplate>> {
        self.function_template.as_ref()
    }

    pub fn env(&self) -> Option<Arc<TemplateEnv>> {
        self.object_template
            .as_ref()
            .map(|t| Arc::clone(t.env()))
            .or_else(|| self.function_template.as_ref().map(|t| Arc::clone(t.env())))
    }

    /// Name of the property being called, empty for constructors
    pub fn property_name(&self) -> &str {
        &self.property
    }

    pub fn return_value(&mut self) -> &mut ReturnValue<'a> {
        &mut self.ret
    }

    /// Serialize all arguments
    pub fn to_params(&self) -> Vec<ValueTree> {
        args_to_params(self.ctx, self.args)
    }

    pub(crate) fn take_return(self) -> tether_engine::Result<Option<Value>> {
        self.ret.into_result()
    }
}

/// Context of one async dispatch. Cheap to clone and safe to move to a
/// worker thread; results travel back through the owning object's
/// [`AsyncExecutor`].
///
/// Every `post*` is a no-op once the owning native object is gone.
#[derive(Clone)]
pub struct AsyncInfo {
    token: Token,
    params: Vec<ValueTree>,
    native: Weak<NativeObject>,
    template: Arc<ObjectTemplate>,
    property: String,
    data: Option<AsyncData>,
}

impl std::fmt::Debug for AsyncInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncInfo")
            .field("token", &self.token)
            .field("property", &self.property)
            .field("params", &self.params)
            .finish()
    }
}

impl AsyncInfo {
    pub(crate) fn new(native: &Arc<NativeObject>, template: Arc<ObjectTemplate>, property: &str) -> Self {
        Self {
            token: Token::NONE,
            params: Vec::new(),
            native: Arc::downgrade(native),
            template,
            property: property.to_string(),
            data: None,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn set_token(&mut self, token: Token) {
        self.token = token;
    }

    pub fn params(&self) -> &[ValueTree] {
        &self.params
    }

    /// Parameter at `index`, or null
    pub fn param(&self, index: usize) -> ValueTree {
        self.params.get(index).cloned().unwrap_or_default()
    }

    pub fn set_params(&mut self, params: Vec<ValueTree>) {
        self.params = params;
    }

    pub fn native(&self) -> Option<Arc<NativeObject>> {
        self.native.upgrade()
    }

    pub fn template(&self) -> &Arc<ObjectTemplate> {
        &self.template
    }

    pub fn env(&self) -> &Arc<TemplateEnv> {
        self.template.env()
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn data(&self) -> Option<&AsyncData> {
        self.data.as_ref()
    }

    pub fn data_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data.clone()?.downcast::<T>().ok()
    }

    pub fn set_data(&mut self, data: AsyncData) {
        self.data = Some(data);
    }

    fn executor(&self) -> Option<Arc<AsyncExecutor>> {
        let native = self.native.upgrade()?;
        native.async_executor()
    }

    /// Deliver a result
    pub fn post(&self, result: impl Into<ValueTree>) {
        self.post_value_tree(result.into());
    }

    pub fn post_value_tree(&self, result: ValueTree) {
        match self.executor() {
            Some(executor) => executor.on_callback_async(self.token, result, None, true),
            None => tracing::debug!("{}: owner is gone, result dropped", self.property),
        }
    }

    /// Deliver JSON text, parsed on the engine thread
    pub fn post_json(&self, json: impl Into<String>) {
        match self.executor() {
            Some(executor) => executor.on_callback_json_async(self.token, json.into(), None, true),
            None => tracing::debug!("{}: owner is gone, result dropped", self.property),
        }
    }

    pub fn post_error(&self, message: impl Into<String>) {
        self.post_error_desc(ErrorDesc::new(message));
    }

    pub fn post_error_desc(&self, error: ErrorDesc) {
        match self.executor() {
            Some(executor) => executor.on_callback_async(self.token, ValueTree::null(), Some(error), true),
            None => tracing::debug!("{}: owner is gone, error dropped", self.property),
        }
    }

    /// Deliver `payload` itself as the error value
    pub fn post_error_value(&self, payload: ValueTree) {
        self.post_error_desc(ErrorDesc::custom(payload));
    }

    /// `info.post_error_fmt(format_args!("bad id {}", id))`
    pub fn post_error_fmt(&self, args: std::fmt::Arguments<'_>) {
        self.post_error(args.to_string());
    }

    /// Run `f` on the engine thread and deliver what it returns. A throw
    /// inside `f` is delivered as the error.
    pub fn post_js_thread<F>(&self, f: F)
    where
        F: FnOnce(&mut JsThreadInfo<'_>) + Send + 'static,
    {
        let Some(executor) = self.executor() else {
            tracing::debug!("{}: owner is gone, engine job dropped", self.property);
            return;
        };
        let info = self.clone();
        executor.handler().post(move |ctx| {
            let Some(native) = info.native() else {
                return;
            };
            let Some(executor) = native.async_executor() else {
                return;
            };
            let mut thread_info = JsThreadInfo {
                ctx,
                native,
                template: Arc::clone(&info.template),
                data: info.data.clone(),
                ret: ReturnValue::new(ctx),
            };
            f(&mut thread_info);
            match thread_info.ret.into_result() {
                Ok(value) => {
                    let value = value.unwrap_or_default();
                    executor.on_callback_values(ctx, info.token, &[value], None, true);
                }
                Err(_) => {
                    let exception = ctx.catch();
                    let error = ErrorDesc::from_exception(ctx, &exception);
                    executor.on_error(ctx, info.token, &error, true);
                }
            }
        });
    }

    /// True once the token was delivered, or the owner is gone
    pub fn is_settled(&self) -> bool {
        match self.executor() {
            Some(executor) => executor.is_settled(self.token),
            None => true,
        }
    }
}

/// Engine-thread context of [`AsyncInfo::post_js_thread`]
pub struct JsThreadInfo<'a> {
    ctx: &'a Context,
    native: Arc<NativeObject>,
    template: Arc<ObjectTemplate>,
    data: Option<AsyncData>,
    ret: ReturnValue<'a>,
}

impl<'a> JsThreadInfo<'a> {
    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    pub fn native(&self) -> &Arc<NativeObject> {
        &self.native
    }

    pub fn template(&self) -> &Arc<ObjectTemplate> {
        &self.template
    }

    pub fn env(&self) -> &Arc<TemplateEnv> {
        self.template.env()
    }

    pub fn data(&self) -> Option<&AsyncData> {
        self.data.as_ref()
    }

    pub fn return_value(&mut self) -> &mut ReturnValue<'a> {
        &mut self.ret
    }
}

/// Context of the prepare hooks that run before an async dispatch
pub struct PrepareInfo<'a, 'b> {
    pub(crate) ctx: &'a Context,
    pub(crate) native: &'a Arc<NativeObject>,
    pub(crate) executor: &'a Arc<AsyncExecutor>,
    pub(crate) args: &'a [Value],
    pub(crate) info: &'b mut AsyncInfo,
}

impl PrepareInfo<'_, '_> {
    pub fn context(&self) -> &Context {
        self.ctx
    }

    pub fn native(&self) -> &Arc<NativeObject> {
        self.native
    }

    pub fn executor(&self) -> &Arc<AsyncExecutor> {
        self.executor
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Argument at `index` as a tree
    pub fn arg_tree(&self, index: usize) -> ValueTree {
        js_to_value_tree(self.ctx, &self.arg(index))
    }

    pub fn info(&mut self) -> &mut AsyncInfo {
        self.info
    }

    /// Register `func` with the executor
    pub fn add_callback(&self, func: &Value, kind: CallbackKind) -> Token {
        self.executor.add_callback(self.ctx, func, kind)
    }

    /// Settle the dispatch's token with `error` right away, which also
    /// skips the dispatch
    pub fn reject(&self, error: ErrorDesc) {
        self.executor.on_error(self.ctx, self.info.token(), &error, true);
    }
}
