//! Async callback registry and delivery
//!
//! An [`AsyncExecutor`] keeps script callbacks alive between an async call
//! and its completion. Each registration gets a fresh [`Token`]; delivery
//! by token calls the stored functions in a shape chosen by their
//! [`CallbackKind`] and, by default, forgets the token so it fires once.
//!
//! The synchronous entry points must run on the engine thread. The `_async`
//! variants may be called from any thread and re-post themselves onto the
//! engine's job queue first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tether_engine::{Context, JsHandler, Value};
use tether_value::ValueTree;

use crate::convert::{json_to_js, value_tree_to_js};
use crate::error::ErrorDesc;

/// Callback registration handle. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Token(pub u32);

impl Token {
    pub const NONE: Token = Token(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a stored callback is invoked on delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// `cb(result)` or `cb(error)`
    Simple,
    /// `cb(null, result)` or `cb(error, result)`
    Std,
    /// Promise resolve function, called on success only
    Resolve,
    /// Promise reject function, called on error only
    Reject,
    /// `cb(...results)`, skipped on error
    Raw,
}

#[derive(Debug, Clone)]
struct CallbackDesc {
    kind: CallbackKind,
    func: Value,
}

/// Per-object async callback registry
pub struct AsyncExecutor {
    handler: JsHandler,
    next_token: AtomicU32,
    callbacks: Mutex<HashMap<u32, Vec<CallbackDesc>>>,
}

impl std::fmt::Debug for AsyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncExecutor").field("pending", &self.pending()).finish()
    }
}

impl AsyncExecutor {
    pub fn new(handler: JsHandler) -> Self {
        Self {
            handler,
            next_token: AtomicU32::new(0),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub fn handler(&self) -> &JsHandler {
        &self.handler
    }

    fn gen_token(&self) -> Token {
        loop {
            let id = self.next_token.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return Token(id);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Vec<CallbackDesc>>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `func` under a fresh token. The function stays pinned until
    /// the token is delivered or removed.
    pub fn add_callback(&self, ctx: &Context, func: &Value, kind: CallbackKind) -> Token {
        let token = self.gen_token();
        let func = ctx.dup_value(func);
        self.lock().insert(token.0, vec![CallbackDesc { kind, func }]);
        token
    }

    /// Create a promise and store its resolve/reject pair under one token.
    /// `tip` is attached to all three values as a `tip` property.
    pub fn create_promise_id(&self, ctx: &Context, tip: &str) -> tether_engine::Result<(Token, Value)> {
        tracing::debug!("create promise {}", tip);
        let (promise, resolve, reject) = ctx.new_promise_capability()?;
        for target in [&promise, &resolve, &reject] {
            ctx.set_property(target, "tip", Value::from(tip))?;
        }
        let token = self.gen_token();
        let descs = vec![
            CallbackDesc { kind: CallbackKind::Resolve, func: ctx.dup_value(&resolve) },
            CallbackDesc { kind: CallbackKind::Reject, func: ctx.dup_value(&reject) },
        ];
        self.lock().insert(token.0, descs);
        Ok((token, promise))
    }

    /// True while `token` is registered
    pub fn has_callback(&self, token: Token) -> bool {
        self.lock().contains_key(&token.0)
    }

    /// True once `token` was delivered or removed
    pub fn is_settled(&self, token: Token) -> bool {
        !self.has_callback(token)
    }

    /// Number of registered tokens
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Forget `token` without calling its functions
    pub fn remove_callback(&self, ctx: &Context, token: Token) -> bool {
        let removed = self.lock().remove(&token.0);
        match removed {
            Some(descs) => {
                descs.into_iter().for_each(|d| ctx.free_value(d.func));
                true
            }
            None => {
                tracing::debug!("remove callback: token {} not found", token);
                false
            }
        }
    }

    pub fn remove_callback_async(self: &Arc<Self>, token: Token) {
        let this = Arc::clone(self);
        self.handler.post(move |ctx| {
            this.remove_callback(ctx, token);
        });
    }

    // === delivery ===

    /// Deliver a tree result, or `error` if set
    pub fn on_callback(
        &self,
        ctx: &Context,
        token: Token,
        result: &ValueTree,
        error: Option<&ErrorDesc>,
        auto_del: bool,
    ) {
        if !self.has_callback(token) {
            tracing::debug!("on_callback: token {} not found", token);
            return;
        }
        let value = value_tree_to_js(ctx, result);
        self.deliver(ctx, token, &[value], error, auto_del);
    }

    /// Deliver JSON text. Empty text delivers undefined. Text that fails
    /// to parse delivers the parse exception, after logging it.
    pub fn on_callback_json(&self, ctx: &Context, token: Token, json: &str, error: Option<&ErrorDesc>, auto_del: bool) {
        if !self.has_callback(token) {
            tracing::debug!("on_callback_json: token {} not found", token);
            return;
        }
        let value = if json.is_empty() {
            Value::Undefined
        } else {
            json_to_js(ctx, json).unwrap_or_else(|_| {
                let exception = ctx.catch();
                ctx.dump_error(&exception);
                exception
            })
        };
        self.deliver(ctx, token, &[value], error, auto_del);
    }

    /// Deliver engine values as they are
    pub fn on_callback_values(
        &self,
        ctx: &Context,
        token: Token,
        values: &[Value],
        error: Option<&ErrorDesc>,
        auto_del: bool,
    ) {
        self.deliver(ctx, token, values, error, auto_del);
    }

    /// Deliver an error with no result
    pub fn on_error(&self, ctx: &Context, token: Token, error: &ErrorDesc, auto_del: bool) {
        self.deliver(ctx, token, &[], Some(error), auto_del);
    }

    pub fn on_callback_async(self: &Arc<Self>, token: Token, result: ValueTree, error: Option<ErrorDesc>, auto_del: bool) {
        let this = Arc::clone(self);
        self.handler.post(move |ctx| this.on_callback(ctx, token, &result, error.as_ref(), auto_del));
    }

    pub fn on_callback_json_async(self: &Arc<Self>, token: Token, json: String, error: Option<ErrorDesc>, auto_del: bool) {
        let this = Arc::clone(self);
        self.handler.post(move |ctx| this.on_callback_json(ctx, token, &json, error.as_ref(), auto_del));
    }

    pub fn on_error_async(self: &Arc<Self>, token: Token, error: ErrorDesc, auto_del: bool) {
        let this = Arc::clone(self);
        self.handler.post(move |ctx| this.on_error(ctx, token, &error, auto_del));
    }

    fn deliver(&self, ctx: &Context, token: Token, values: &[Value], error: Option<&ErrorDesc>, auto_del: bool) {
        let descs = self.lock().get(&token.0).cloned();
        let Some(descs) = descs else {
            tracing::debug!("deliver: token {} not found", token);
            return;
        };
        // keep the functions alive even if a callback removes the token
        let held: Vec<Value> = descs.iter().map(|d| ctx.dup_value(&d.func)).collect();
        let first = values.first().cloned().unwrap_or_default();
        for desc in &descs {
            let result = match (desc.kind, error) {
                (CallbackKind::Resolve, None) => {
                    ctx.call(&desc.func, &Value::Undefined, &values[..values.len().min(1)])
                }
                (CallbackKind::Reject, Some(error)) => {
                    let reason = error.to_value(ctx);
                    if !first.is_undefined() {
                        let _ = ctx.set_property(&reason, "res", first.clone());
                    }
                    ctx.call(&desc.func, &Value::Undefined, &[reason])
                }
                (CallbackKind::Resolve, Some(_)) | (CallbackKind::Reject, None) => continue,
                (CallbackKind::Std, None) => ctx.call(&desc.func, &Value::Undefined, &[Value::Null, first.clone()]),
                (CallbackKind::Std, Some(error)) => {
                    ctx.call(&desc.func, &Value::Undefined, &[error.to_value(ctx), first.clone()])
                }
                (CallbackKind::Simple, None) => ctx.call(&desc.func, &Value::Undefined, &[first.clone()]),
                (CallbackKind::Simple, Some(error)) => ctx.call(&desc.func, &Value::Undefined, &[error.to_value(ctx)]),
                (CallbackKind::Raw, None) => ctx.call(&desc.func, &Value::Undefined, values),
                (CallbackKind::Raw, Some(_)) => continue,
            };
            if result.is_err() {
                tracing::warn!("async callback for token {} threw", token);
                ctx.dump_pending();
            }
        }
        held.into_iter().for_each(|f| ctx.free_value(f));
        if auto_del {
            let removed = self.lock().remove(&token.0);
            removed.into_iter().flatten().for_each(|d| ctx.free_value(d.func));
        }
    }
}

impl Drop for AsyncExecutor {
    fn drop(&mut self) {
        let funcs: Vec<Value> = self
            .callbacks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .flat_map(|(_, descs)| descs.into_iter().map(|d| d.func))
            .collect();
        if funcs.is_empty() {
            return;
        }
        tracing::debug!("async executor dropped with {} pending callbacks", funcs.len());
        self.handler.post(move |ctx| funcs.into_iter().for_each(|f| ctx.free_value(f)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_engine::PromiseState;

    fn recorder(ctx: &Context) -> (Value, Value) {
        let log = ctx.new_array(vec![]);
        let func = ctx.new_function("cb", 2, 0, vec![log.clone()], |ctx, inv| {
            let call = ctx.new_array(inv.args.to_vec());
            ctx.array_push(&inv.data(0), call)?;
            Ok(Value::Undefined)
        });
        ctx.set_property(&ctx.global(), "log", log.clone()).unwrap();
        (func, log)
    }

    #[test]
    fn test_std_callback_fires_once() {
        let ctx = Context::new();
        let exec = AsyncExecutor::new(ctx.handler());
        let (cb, log) = recorder(&ctx);
        let token = exec.add_callback(&ctx, &cb, CallbackKind::Std);
        assert!(!token.is_none());
        assert_eq!(ctx.pin_count(&cb), 1);

        exec.on_callback(&ctx, token, &"hello".into(), None, true);
        exec.on_callback(&ctx, token, &"again".into(), None, true);

        assert_eq!(ctx.array_len(&log).unwrap(), 1);
        let call = ctx.array_get(&log, 0).unwrap();
        assert_eq!(ctx.array_get(&call, 0).unwrap(), Value::Null);
        assert_eq!(ctx.array_get(&call, 1).unwrap(), Value::from("hello"));
        assert!(exec.is_settled(token));
        assert_eq!(ctx.pin_count(&cb), 0);
    }

    #[test]
    fn test_tokens_are_unique() {
        let ctx = Context::new();
        let exec = AsyncExecutor::new(ctx.handler());
        let (cb, _) = recorder(&ctx);
        let a = exec.add_callback(&ctx, &cb, CallbackKind::Simple);
        let b = exec.add_callback(&ctx, &cb, CallbackKind::Simple);
        assert_ne!(a, b);
        assert_eq!(exec.pending(), 2);
    }

    #[test]
    fn test_promise_rejects_with_res() {
        let ctx = Context::new();
        let exec = AsyncExecutor::new(ctx.handler());
        let (token, promise) = exec.create_promise_id(&ctx, "Device.open").unwrap();
        assert_eq!(ctx.get_property(&promise, "tip").unwrap(), Value::from("Device.open"));

        exec.on_callback(&ctx, token, &ValueTree::from(3), Some(&ErrorDesc::new("busy")), true);
        assert_eq!(ctx.promise_state(&promise), Some(PromiseState::Rejected));
        let reason = ctx.promise_result(&promise);
        assert_eq!(ctx.get_property(&reason, "message").unwrap(), Value::from("busy"));
        assert_eq!(ctx.get_property(&reason, "res").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_remove_callback_does_not_invoke() {
        let ctx = Context::new();
        let exec = AsyncExecutor::new(ctx.handler());
        let (cb, log) = recorder(&ctx);
        let token = exec.add_callback(&ctx, &cb, CallbackKind::Simple);
        assert!(exec.remove_callback(&ctx, token));
        assert!(!exec.remove_callback(&ctx, token));
        exec.on_error(&ctx, token, &ErrorDesc::new("late"), true);
        assert_eq!(ctx.array_len(&log).unwrap(), 0);
    }

    #[test]
    fn test_raw_skipped_on_error() {
        let ctx = Context::new();
        let exec = AsyncExecutor::new(ctx.handler());
        let (cb, log) = recorder(&ctx);
        let token = exec.add_callback(&ctx, &cb, CallbackKind::Raw);
        exec.on_error(&ctx, token, &ErrorDesc::new("x"), false);
        assert_eq!(ctx.array_len(&log).unwrap(), 0);
        exec.on_callback_values(&ctx, token, &[Value::Int(1), Value::Int(2)], None, true);
        let call = ctx.array_get(&log, 0).unwrap();
        assert_eq!(ctx.array_len(&call).unwrap(), 2);
    }

    #[test]
    fn test_bad_json_delivers_exception() {
        let ctx = Context::new();
        let exec = AsyncExecutor::new(ctx.handler());
        let (cb, log) = recorder(&ctx);
        let token = exec.add_callback(&ctx, &cb, CallbackKind::Simple);
        exec.on_callback_json(&ctx, token, "{nope", None, true);
        let call = ctx.array_get(&log, 0).unwrap();
        assert!(ctx.is_error(&ctx.array_get(&call, 0).unwrap()));
        assert!(!ctx.has_exception());
    }

    #[test]
    fn test_drop_releases_pins_on_engine_thread() {
        let ctx = Context::new();
        let exec = Arc::new(AsyncExecutor::new(ctx.handler()));
        let (cb, _) = recorder(&ctx);
        exec.add_callback(&ctx, &cb, CallbackKind::Std);
        let worker = {
            let exec = Arc::clone(&exec);
            std::thread::spawn(move || drop(exec))
        };
        drop(exec);
        worker.join().unwrap();
        assert_eq!(ctx.pin_count(&cb), 1);
        ctx.run_jobs();
        assert_eq!(ctx.pin_count(&cb), 0);
    }
}
