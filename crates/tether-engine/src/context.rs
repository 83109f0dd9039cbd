//! Engine context
//!
//! Single-threaded owner of the heap, atoms, classes, pending exception and
//! job queue. Every method borrows engine state only for the duration of the
//! lookup, so native callbacks are free to re-enter the context.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::atom::{Atom, AtomTable, IntoAtom};
use crate::class::{ClassDef, ClassId, Opaque};
use crate::function::{Invocation, NativeFn};
use crate::gc::GcStats;
use crate::handler::JsHandler;
use crate::heap::Heap;
use crate::object::{FunctionData, HeapObject, ObjectKind, PromiseState, Property, PropertyFlags, Slot};
use crate::value::{ObjectId, Value};
use crate::{Error, Result};

/// Built-in error constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    Syntax,
    Type,
    Reference,
    Range,
    Internal,
    OutOfMemory,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Syntax => "SyntaxError",
            Self::Type => "TypeError",
            Self::Reference => "ReferenceError",
            Self::Range => "RangeError",
            Self::Internal | Self::OutOfMemory => "InternalError",
        }
    }
}

pub(crate) struct Inner {
    pub heap: RefCell<Heap>,
    atoms: RefCell<AtomTable>,
    pub classes: RefCell<Vec<ClassDef>>,
    pub global: ObjectId,
    pub exception: RefCell<Option<Value>>,
    pub handler: JsHandler,
    pub stats: RefCell<GcStats>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.handler.unregister();
        self.handler.queue.close();
        let dropped = self.handler.queue.drain().len();
        if dropped > 0 {
            tracing::debug!("context dropped with {} queued jobs", dropped);
        }
    }
}

/// Engine context handle. Clones share the same engine.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Rc<Inner>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("objects", &self.object_count())
            .field("pending_jobs", &self.inner.handler.pending())
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) == 1 {
            self.teardown();
        }
    }
}

impl Context {
    /// Create a context owned by the current thread
    pub fn new() -> Self {
        let mut heap = Heap::default();
        let global = heap.alloc(HeapObject::new(ObjectKind::Plain));
        let inner = Rc::new(Inner {
            heap: RefCell::new(heap),
            atoms: RefCell::new(AtomTable::default()),
            classes: RefCell::new(vec![ClassDef::new("Object")]),
            global,
            exception: RefCell::new(None),
            handler: JsHandler::new(),
            stats: RefCell::new(GcStats::default()),
        });
        inner.handler.register(&inner);
        Self { inner }
    }

    pub fn global(&self) -> Value {
        Value::Object(self.inner.global)
    }

    // === atoms ===

    pub fn atom(&self, name: &str) -> Atom {
        self.inner.atoms.borrow_mut().intern(name)
    }

    pub fn atom_name(&self, atom: Atom) -> Arc<str> {
        self.inner.atoms.borrow().name(atom)
    }

    // === object access helpers ===

    pub(crate) fn object_id(&self, value: &Value) -> Result<ObjectId> {
        let id = value.as_object().ok_or(Error::NotAnObject)?;
        if self.inner.heap.borrow().get(id).is_none() {
            return Err(Error::StaleObject);
        }
        Ok(id)
    }

    pub(crate) fn with_object<R>(&self, value: &Value, f: impl FnOnce(&HeapObject) -> R) -> Result<R> {
        let id = value.as_object().ok_or(Error::NotAnObject)?;
        let heap = self.inner.heap.borrow();
        heap.get(id).map(f).ok_or(Error::StaleObject)
    }

    pub(crate) fn with_object_mut<R>(&self, value: &Value, f: impl FnOnce(&mut HeapObject) -> R) -> Result<R> {
        let id = value.as_object().ok_or(Error::NotAnObject)?;
        let mut heap = self.inner.heap.borrow_mut();
        heap.get_mut(id).map(f).ok_or(Error::StaleObject)
    }

    fn alloc(&self, object: HeapObject) -> Value {
        Value::Object(self.inner.heap.borrow_mut().alloc(object))
    }

    /// True while `value` is an object that has not been collected
    pub fn is_live(&self, value: &Value) -> bool {
        self.object_id(value).is_ok()
    }

    pub fn object_count(&self) -> usize {
        self.inner.heap.borrow().len()
    }

    // === creation ===

    pub fn new_object(&self) -> Value {
        self.alloc(HeapObject::new(ObjectKind::Plain))
    }

    pub fn new_object_with_proto(&self, proto: &Value) -> Result<Value> {
        let proto = match proto {
            Value::Null | Value::Undefined => None,
            other => Some(self.object_id(other)?),
        };
        let mut object = HeapObject::new(ObjectKind::Plain);
        object.proto = proto;
        Ok(self.alloc(object))
    }

    /// Object of a registered class with an optional native payload
    pub fn new_object_class(&self, class: ClassId, opaque: Option<Opaque>) -> Value {
        let mut object = HeapObject::new(ObjectKind::Plain);
        object.class = class;
        object.opaque = opaque;
        self.alloc(object)
    }

    pub fn new_array(&self, items: Vec<Value>) -> Value {
        self.alloc(HeapObject::new(ObjectKind::Array(items)))
    }

    pub fn new_array_buffer(&self, bytes: Vec<u8>) -> Value {
        self.alloc(HeapObject::new(ObjectKind::ArrayBuffer(bytes)))
    }

    pub fn new_error(&self, kind: ErrorKind, message: &str) -> Value {
        let error = self.alloc(HeapObject::new(ObjectKind::Error));
        let flags = PropertyFlags::WRITABLE | PropertyFlags::CONFIGURABLE;
        // freshly allocated, cannot be stale
        let _ = self.define_property_value(&error, "name", kind.name().into(), flags);
        let _ = self.define_property_value(&error, "message", message.into(), flags);
        error
    }

    /// Native function bound to `data` reference slots
    pub fn new_function<F>(&self, name: &str, length: u32, magic: i32, data: Vec<Value>, callback: F) -> Value
    where
        F: Fn(&Context, &Invocation<'_>) -> Result<Value> + 'static,
    {
        let callback: NativeFn = Rc::new(callback);
        let func = self.alloc(HeapObject::new(ObjectKind::Function(FunctionData {
            callback,
            magic,
            data,
            constructor: false,
        })));
        let _ = self.define_property_value(&func, "name", name.into(), PropertyFlags::CONFIGURABLE);
        let _ = self.define_property_value(&func, "length", length.into(), PropertyFlags::CONFIGURABLE);
        func
    }

    // === classes and opaque slots ===

    /// Register a class. Registering an existing name returns its id.
    pub fn register_class(&self, def: ClassDef) -> ClassId {
        if let Some(id) = self.class_id(&def.name) {
            return id;
        }
        let mut classes = self.inner.classes.borrow_mut();
        classes.push(def);
        ClassId(classes.len() as u32 - 1)
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.inner
            .classes
            .borrow()
            .iter()
            .position(|c| c.name == name)
            .map(|i| ClassId(i as u32))
    }

    pub fn class_of(&self, value: &Value) -> Option<ClassId> {
        self.with_object(value, |o| o.class).ok()
    }

    /// Payload of an object of `class`
    pub fn opaque(&self, value: &Value, class: ClassId) -> Option<Opaque> {
        self.with_object(value, |o| if o.class == class { o.opaque.clone() } else { None })
            .ok()
            .flatten()
    }

    /// Remove and return the payload of an object of `class`
    pub fn take_opaque(&self, value: &Value, class: ClassId) -> Option<Opaque> {
        self.with_object_mut(value, |o| if o.class == class { o.opaque.take() } else { None })
            .ok()
            .flatten()
    }

    pub fn set_opaque(&self, value: &Value, opaque: Opaque) -> Result<()> {
        self.with_object_mut(value, |o| o.opaque = Some(opaque))
    }

    // === properties ===

    pub fn define_property_value(&self, obj: &Value, key: impl IntoAtom, value: Value, flags: PropertyFlags) -> Result<()> {
        let atom = key.into_atom(self);
        self.with_object_mut(obj, |o| o.define(atom, Property { slot: Slot::Data(value), flags }))
    }

    pub fn define_property_accessor(
        &self,
        obj: &Value,
        key: impl IntoAtom,
        getter: Option<Value>,
        setter: Option<Value>,
        flags: PropertyFlags,
    ) -> Result<()> {
        let atom = key.into_atom(self);
        self.with_object_mut(obj, |o| {
            o.define(atom, Property { slot: Slot::Accessor { getter, setter }, flags })
        })
    }

    /// Find `atom` on the object or its prototype chain
    fn lookup(&self, obj: &Value, atom: Atom) -> Result<Option<Property>> {
        let mut id = self.object_id(obj)?;
        let heap = self.inner.heap.borrow();
        loop {
            let object = heap.get(id).ok_or(Error::StaleObject)?;
            if let Some(prop) = object.find(atom) {
                return Ok(Some(prop.clone()));
            }
            match object.proto {
                Some(proto) => id = proto,
                None => return Ok(None),
            }
        }
    }

    /// Read a property, running getters
    pub fn get_property(&self, obj: &Value, key: impl IntoAtom) -> Result<Value> {
        let atom = key.into_atom(self);
        match self.lookup(obj, atom)? {
            Some(Property { slot: Slot::Data(v), .. }) => Ok(v),
            Some(Property { slot: Slot::Accessor { getter: Some(getter), .. }, .. }) => {
                self.call(&getter, obj, &[])
            }
            _ => Ok(Value::Undefined),
        }
    }

    /// Write a property, running setters
    pub fn set_property(&self, obj: &Value, key: impl IntoAtom, value: Value) -> Result<()> {
        let atom = key.into_atom(self);
        match self.lookup(obj, atom)? {
            Some(Property { slot: Slot::Accessor { setter: Some(setter), .. }, .. }) => {
                self.call(&setter, obj, &[value]).map(|_| ())
            }
            Some(Property { slot: Slot::Accessor { setter: None, .. }, .. }) => {
                let name = self.atom_name(atom);
                Err(self.throw_error(ErrorKind::Type, &format!("no setter for property '{name}'")))
            }
            Some(Property { slot: Slot::Data(_), flags }) if !flags.contains(PropertyFlags::WRITABLE) => {
                let name = self.atom_name(atom);
                Err(self.throw_error(ErrorKind::Type, &format!("'{name}' is read-only")))
            }
            _ => self.with_object_mut(obj, |o| match o.find_mut(atom) {
                Some(own) => own.slot = Slot::Data(value),
                None => o.define(atom, Property { slot: Slot::Data(value), flags: PropertyFlags::ALL }),
            }),
        }
    }

    pub fn has_property(&self, obj: &Value, key: impl IntoAtom) -> Result<bool> {
        let atom = key.into_atom(self);
        Ok(self.lookup(obj, atom)?.is_some())
    }

    /// Delete an own configurable property. Returns false when it is not configurable.
    pub fn delete_property(&self, obj: &Value, key: impl IntoAtom) -> Result<bool> {
        let atom = key.into_atom(self);
        self.with_object_mut(obj, |o| match o.find(atom) {
            Some(p) if !p.flags.contains(PropertyFlags::CONFIGURABLE) => false,
            Some(_) => o.remove(atom).is_some(),
            None => true,
        })
    }

    /// Enumerable own keys in definition order
    pub fn own_keys(&self, obj: &Value) -> Result<Vec<Atom>> {
        self.with_object(obj, |o| {
            o.props
                .iter()
                .filter(|(_, p)| p.flags.contains(PropertyFlags::ENUMERABLE))
                .map(|(a, _)| *a)
                .collect()
        })
    }

    pub fn property_flags(&self, obj: &Value, key: impl IntoAtom) -> Result<Option<PropertyFlags>> {
        let atom = key.into_atom(self);
        self.with_object(obj, |o| o.find(atom).map(|p| p.flags))
    }

    pub fn get_prototype(&self, obj: &Value) -> Result<Value> {
        self.with_object(obj, |o| o.proto.map(Value::Object).unwrap_or(Value::Null))
    }

    pub fn set_prototype(&self, obj: &Value, proto: &Value) -> Result<()> {
        let proto = match proto {
            Value::Null | Value::Undefined => None,
            other => Some(self.object_id(other)?),
        };
        self.with_object_mut(obj, |o| o.proto = proto)
    }

    // === arrays and buffers ===

    pub fn is_array(&self, value: &Value) -> bool {
        self.with_object(value, |o| matches!(o.kind, ObjectKind::Array(_))).unwrap_or(false)
    }

    pub fn array_len(&self, value: &Value) -> Result<usize> {
        self.with_object(value, |o| match &o.kind {
            ObjectKind::Array(items) => items.len(),
            _ => 0,
        })
    }

    pub fn array_get(&self, value: &Value, index: usize) -> Result<Value> {
        self.with_object(value, |o| match &o.kind {
            ObjectKind::Array(items) => items.get(index).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        })
    }

    pub fn array_push(&self, value: &Value, item: Value) -> Result<()> {
        self.with_object_mut(value, |o| {
            if let ObjectKind::Array(items) = &mut o.kind {
                items.push(item);
            }
        })
    }

    pub fn array_buffer_bytes(&self, value: &Value) -> Option<Vec<u8>> {
        self.with_object(value, |o| match &o.kind {
            ObjectKind::ArrayBuffer(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .ok()
        .flatten()
    }

    // === functions ===

    pub fn is_function(&self, value: &Value) -> bool {
        self.with_object(value, |o| matches!(o.kind, ObjectKind::Function(_))).unwrap_or(false)
    }

    pub fn is_constructor(&self, value: &Value) -> bool {
        self.with_object(value, |o| matches!(&o.kind, ObjectKind::Function(f) if f.constructor))
            .unwrap_or(false)
    }

    pub fn set_constructor_bit(&self, func: &Value, constructor: bool) -> Result<()> {
        self.with_object_mut(func, |o| {
            if let ObjectKind::Function(f) = &mut o.kind {
                f.constructor = constructor;
            }
        })
    }

    /// Link `func.prototype` and `proto.constructor` and mark `func` constructible
    pub fn set_constructor(&self, func: &Value, proto: &Value) -> Result<()> {
        self.define_property_value(func, "prototype", proto.clone(), PropertyFlags::WRITABLE)?;
        self.define_property_value(
            proto,
            "constructor",
            func.clone(),
            PropertyFlags::WRITABLE | PropertyFlags::CONFIGURABLE,
        )?;
        self.set_constructor_bit(func, true)
    }

    fn function_parts(&self, func: &Value) -> Result<Option<(NativeFn, i32, Vec<Value>, bool)>> {
        self.with_object(func, |o| match &o.kind {
            ObjectKind::Function(f) => Some((Rc::clone(&f.callback), f.magic, f.data.clone(), f.constructor)),
            _ => None,
        })
    }

    /// Call `func` with `this` and `args`
    pub fn call(&self, func: &Value, this: &Value, args: &[Value]) -> Result<Value> {
        let Some((callback, magic, data, _)) = self.function_parts(func).unwrap_or(None) else {
            return Err(self.throw_error(ErrorKind::Type, "not a function"));
        };
        callback(self, &Invocation { this, args, magic, data: &data, new_target: None })
    }

    /// Invoke `func` as `new func(...args)`; the native body builds the instance
    pub fn call_constructor(&self, func: &Value, args: &[Value]) -> Result<Value> {
        self.call_constructor_with_target(func, func, args)
    }

    pub fn call_constructor_with_target(&self, func: &Value, new_target: &Value, args: &[Value]) -> Result<Value> {
        let parts = self.function_parts(func).unwrap_or(None);
        let Some((callback, magic, data, true)) = parts else {
            return Err(self.throw_error(ErrorKind::Type, "not a constructor"));
        };
        callback(self, &Invocation {
            this: &Value::Undefined,
            args,
            magic,
            data: &data,
            new_target: Some(new_target),
        })
    }

    // === promises ===

    /// Create a pending promise with its resolve and reject functions
    pub fn new_promise_capability(&self) -> Result<(Value, Value, Value)> {
        let promise = self.alloc(HeapObject::new(ObjectKind::Promise {
            state: PromiseState::Pending,
            result: Value::Undefined,
        }));
        let resolve = self.new_function("resolve", 1, 0, vec![promise.clone()], |ctx, inv| {
            ctx.settle_promise(&inv.data(0), PromiseState::Fulfilled, inv.arg(0))?;
            Ok(Value::Undefined)
        });
        let reject = self.new_function("reject", 1, 0, vec![promise.clone()], |ctx, inv| {
            ctx.settle_promise(&inv.data(0), PromiseState::Rejected, inv.arg(0))?;
            Ok(Value::Undefined)
        });
        Ok((promise, resolve, reject))
    }

    fn settle_promise(&self, promise: &Value, to: PromiseState, value: Value) -> Result<()> {
        self.with_object_mut(promise, |o| {
            if let ObjectKind::Promise { state, result } = &mut o.kind {
                if *state == PromiseState::Pending {
                    *state = to;
                    *result = value;
                }
            }
        })
    }

    pub fn promise_state(&self, value: &Value) -> Option<PromiseState> {
        self.with_object(value, |o| match &o.kind {
            ObjectKind::Promise { state, .. } => Some(*state),
            _ => None,
        })
        .ok()
        .flatten()
    }

    pub fn promise_result(&self, value: &Value) -> Value {
        self.with_object(value, |o| match &o.kind {
            ObjectKind::Promise { result, .. } => result.clone(),
            _ => Value::Undefined,
        })
        .unwrap_or_default()
    }

    // === exceptions ===

    /// Make `value` the pending exception
    pub fn throw(&self, value: Value) -> Error {
        *self.inner.exception.borrow_mut() = Some(value);
        Error::Exception
    }

    pub fn throw_error(&self, kind: ErrorKind, message: &str) -> Error {
        let error = self.new_error(kind, message);
        self.throw(error)
    }

    /// Take the pending exception
    pub fn catch(&self) -> Value {
        self.inner.exception.borrow_mut().take().unwrap_or_default()
    }

    pub fn has_exception(&self) -> bool {
        self.inner.exception.borrow().is_some()
    }

    pub fn is_error(&self, value: &Value) -> bool {
        self.with_object(value, |o| matches!(o.kind, ObjectKind::Error)).unwrap_or(false)
    }

    /// "Name: message" plus stack when present
    pub fn describe_exception(&self, value: &Value) -> String {
        if !value.is_object() || self.is_function(value) {
            return self.to_display_string(value);
        }
        let name = self.get_property(value, "name").unwrap_or_default();
        let message = self.get_property(value, "message").unwrap_or_default();
        let mut text = match (name.as_str(), message.as_str()) {
            (Some(n), Some(m)) if !n.is_empty() => format!("{n}: {m}"),
            (_, Some(m)) => m.to_string(),
            _ => self.to_display_string(value),
        };
        if let Ok(Value::String(stack)) = self.get_property(value, "stack") {
            if !stack.is_empty() {
                text.push('\n');
                text.push_str(&stack);
            }
        }
        text
    }

    /// Log an exception value
    pub fn dump_error(&self, value: &Value) {
        tracing::error!("{}", self.describe_exception(value));
    }

    /// Take and log the pending exception
    pub fn dump_pending(&self) {
        let exception = self.catch();
        self.dump_error(&exception);
    }

    pub fn to_display_string(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e21 => format!("{v:.0}"),
            Value::Float(v) => v.to_string(),
            Value::String(s) => s.to_string(),
            Value::Object(_) if self.is_array(value) => {
                let len = self.array_len(value).unwrap_or(0);
                (0..len)
                    .map(|i| self.to_display_string(&self.array_get(value, i).unwrap_or_default()))
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Value::Object(_) if self.is_function(value) => {
                let name = self.get_property(value, "name").unwrap_or_default();
                format!("function {}() {{ [native code] }}", name.as_str().unwrap_or(""))
            }
            Value::Object(_) if self.is_error(value) => self.describe_exception(value),
            Value::Object(_) => "[object Object]".into(),
        }
    }

    // === ownership ===

    /// Take an external reference, keeping the object alive across collections
    pub fn dup_value(&self, value: &Value) -> Value {
        if let Value::Object(id) = value {
            if let Some(o) = self.inner.heap.borrow_mut().get_mut(*id) {
                o.pins += 1;
            }
        }
        value.clone()
    }

    /// Release a reference taken with [`Context::dup_value`]
    pub fn free_value(&self, value: Value) {
        if let Value::Object(id) = value {
            if let Some(o) = self.inner.heap.borrow_mut().get_mut(id) {
                o.pins = o.pins.saturating_sub(1);
            }
        }
    }

    pub fn pin_count(&self, value: &Value) -> u32 {
        self.with_object(value, |o| o.pins).unwrap_or(0)
    }

    // === jobs ===

    pub fn handler(&self) -> JsHandler {
        self.inner.handler.clone()
    }

    pub fn is_engine_thread(&self) -> bool {
        self.inner.handler.is_engine_thread()
    }

    /// Run queued jobs in post order, including jobs they post
    pub fn run_jobs(&self) -> usize {
        let mut count = 0;
        while let Some(job) = self.inner.handler.queue.pop() {
            job(self);
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for a job, then run everything queued
    pub fn poll_jobs(&self, timeout: Duration) -> usize {
        match self.inner.handler.queue.wait_timeout(timeout) {
            Some(job) => {
                job(self);
                1 + self.run_jobs()
            }
            None => 0,
        }
    }

    /// Pump jobs until `done` holds or `timeout` elapses
    pub fn run_jobs_until(&self, mut done: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.run_jobs();
        while !done() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.poll_jobs((deadline - now).min(Duration::from_millis(10)));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_round_trip() {
        let ctx = Context::new();
        let obj = ctx.new_object();
        ctx.set_property(&obj, "x", Value::Int(5)).unwrap();
        assert_eq!(ctx.get_property(&obj, "x").unwrap(), Value::Int(5));
        assert_eq!(ctx.get_property(&obj, "missing").unwrap(), Value::Undefined);
        assert!(ctx.has_property(&obj, "x").unwrap());
        assert!(ctx.delete_property(&obj, "x").unwrap());
        assert!(!ctx.has_property(&obj, "x").unwrap());
    }

    #[test]
    fn test_prototype_chain_lookup() {
        let ctx = Context::new();
        let proto = ctx.new_object();
        ctx.set_property(&proto, "greeting", "hi".into()).unwrap();
        let obj = ctx.new_object_with_proto(&proto).unwrap();
        assert_eq!(ctx.get_property(&obj, "greeting").unwrap(), Value::from("hi"));
        // writes shadow rather than modify the prototype
        ctx.set_property(&obj, "greeting", "yo".into()).unwrap();
        assert_eq!(ctx.get_property(&proto, "greeting").unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_accessor_property() {
        let ctx = Context::new();
        let obj = ctx.new_object();
        let store = ctx.new_object();
        let getter = ctx.new_function("get", 0, 0, vec![store.clone()], |ctx, inv| {
            ctx.get_property(&inv.data(0), "v")
        });
        let setter = ctx.new_function("set", 1, 0, vec![store.clone()], |ctx, inv| {
            ctx.set_property(&inv.data(0), "v", inv.arg(0))?;
            Ok(Value::Undefined)
        });
        ctx.define_property_accessor(&obj, "value", Some(getter), Some(setter), PropertyFlags::ALL)
            .unwrap();
        ctx.set_property(&obj, "value", Value::Int(9)).unwrap();
        assert_eq!(ctx.get_property(&obj, "value").unwrap(), Value::Int(9));
        assert_eq!(ctx.get_property(&store, "v").unwrap(), Value::Int(9));
    }

    #[test]
    fn test_read_only_property_throws() {
        let ctx = Context::new();
        let obj = ctx.new_object();
        ctx.define_property_value(&obj, "k", Value::Int(1), PropertyFlags::ENUMERABLE).unwrap();
        assert_eq!(ctx.set_property(&obj, "k", Value::Int(2)), Err(Error::Exception));
        let exc = ctx.catch();
        assert_eq!(ctx.get_property(&exc, "name").unwrap(), Value::from("TypeError"));
        assert!(!ctx.delete_property(&obj, "k").unwrap());
    }

    #[test]
    fn test_call_with_data_slots_and_magic() {
        let ctx = Context::new();
        let f = ctx.new_function("sum", 2, 10, vec![Value::Int(100)], |_ctx, inv| {
            let a = inv.arg(0).as_int().unwrap_or(0);
            let b = inv.arg(1).as_int().unwrap_or(0);
            let base = inv.data(0).as_int().unwrap_or(0);
            Ok(Value::Int(a + b + base + inv.magic))
        });
        let r = ctx.call(&f, &Value::Undefined, &[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(r, Value::Int(113));
        assert_eq!(ctx.get_property(&f, "name").unwrap(), Value::from("sum"));
    }

    #[test]
    fn test_calling_non_function_throws_type_error() {
        let ctx = Context::new();
        let obj = ctx.new_object();
        assert_eq!(ctx.call(&obj, &Value::Undefined, &[]), Err(Error::Exception));
        let exc = ctx.catch();
        assert_eq!(ctx.describe_exception(&exc), "TypeError: not a function");
        assert!(!ctx.has_exception());
    }

    #[test]
    fn test_constructor_requires_bit() {
        let ctx = Context::new();
        let f = ctx.new_function("F", 0, 0, vec![], |ctx, inv| {
            assert!(inv.is_constructor_call());
            Ok(ctx.new_object())
        });
        assert!(ctx.call_constructor(&f, &[]).is_err());
        ctx.catch();
        let proto = ctx.new_object();
        ctx.set_constructor(&f, &proto).unwrap();
        assert!(ctx.call_constructor(&f, &[]).unwrap().is_object());
        assert_eq!(ctx.get_property(&proto, "constructor").unwrap(), f);
    }

    #[test]
    fn test_promise_settles_once() {
        let ctx = Context::new();
        let (promise, resolve, reject) = ctx.new_promise_capability().unwrap();
        assert_eq!(ctx.promise_state(&promise), Some(PromiseState::Pending));
        ctx.call(&resolve, &Value::Undefined, &[Value::Int(1)]).unwrap();
        ctx.call(&reject, &Value::Undefined, &[Value::Int(2)]).unwrap();
        assert_eq!(ctx.promise_state(&promise), Some(PromiseState::Fulfilled));
        assert_eq!(ctx.promise_result(&promise), Value::Int(1));
    }

    #[test]
    fn test_opaque_requires_matching_class() {
        let ctx = Context::new();
        let class = ctx.register_class(ClassDef::new("Thing"));
        assert_eq!(ctx.register_class(ClassDef::new("Thing")), class);
        let obj = ctx.new_object_class(class, Some(Rc::new(42u32)));
        assert!(ctx.opaque(&obj, ClassId::OBJECT).is_none());
        let payload = ctx.opaque(&obj, class).unwrap();
        assert_eq!(payload.downcast_ref::<u32>(), Some(&42));
        assert!(ctx.take_opaque(&obj, class).is_some());
        assert!(ctx.take_opaque(&obj, class).is_none());
    }

    #[test]
    fn test_jobs_run_in_post_order() {
        let ctx = Context::new();
        let handler = ctx.handler();
        let global = ctx.global();
        for i in 0..3 {
            let g = global.clone();
            handler.post(move |ctx| {
                let prev = ctx.get_property(&g, "log").unwrap().as_str().unwrap_or("").to_string();
                ctx.set_property(&g, "log", format!("{prev}{i}").into()).unwrap();
            });
        }
        assert_eq!(ctx.run_jobs(), 3);
        assert_eq!(ctx.get_property(&global, "log").unwrap(), Value::from("012"));
    }

    #[test]
    fn test_post_from_other_thread() {
        let ctx = Context::new();
        let handler = ctx.handler();
        let global = ctx.global();
        let worker = std::thread::spawn(move || {
            assert!(!handler.is_engine_thread());
            handler.post(move |ctx| {
                ctx.set_property(&global, "done", Value::Bool(true)).unwrap();
            })
        });
        assert!(worker.join().unwrap());
        let g = ctx.global();
        assert!(ctx.run_jobs_until(
            || ctx.get_property(&g, "done").map(|v| v.is_truthy()).unwrap_or(false),
            Duration::from_secs(5)
        ));
    }

    #[test]
    fn test_handler_outlives_context() {
        let ctx = Context::new();
        let handler = ctx.handler();
        drop(ctx);
        assert!(!handler.is_alive());
        assert!(!handler.post(|_| {}));
    }
}
