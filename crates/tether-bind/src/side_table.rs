//! Per-instance side tables
//!
//! Each [`ObjectTemplate`](crate::ObjectTemplate) owns one table per kind,
//! keyed by native object identity. Entries are created lazily and torn
//! down by the detach sequence or by dropping the native object.
//!
//! Removal hands the entry back to the caller so that it is dropped after
//! the table lock is released. Dropping an entry may drop a native object,
//! and that drop touches the same tables.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tether_engine::{Context, Marker, Value};

use crate::executor::AsyncExecutor;
use crate::native::NativeObject;

/// Identity-keyed map
pub struct SideTable<T> {
    entries: Mutex<HashMap<u64, T>>,
}

impl<T> Default for SideTable<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<T> SideTable<T> {
    /// Read an existing entry
    pub fn with<R>(&self, id: u64, f: impl FnOnce(&T) -> R) -> Option<R> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).map(f)
    }

    /// Mutate an existing entry
    pub fn with_mut<R>(&self, id: u64, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get_mut(&id).map(f)
    }

    /// Mutate an entry, creating it with `create` if needed
    pub fn with_or_create_with<R>(&self, id: u64, create: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(entries.entry(id).or_insert_with(create))
    }

    pub fn remove(&self, id: u64) -> Option<T> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Default> SideTable<T> {
    /// Mutate an entry, creating it first if needed
    pub fn with_or_create<R>(&self, id: u64, f: impl FnOnce(&mut T) -> R) -> R {
        self.with_or_create_with(id, T::default, f)
    }
}

/// Script values owned by a native object, traced by its mark hook
#[derive(Default)]
pub struct ValueFields {
    fields: HashMap<String, Value>,
}

impl ValueFields {
    /// Store `value`, returning the replaced one
    pub fn set(&mut self, key: &str, value: Value) -> Option<Value> {
        self.fields.insert(key.to_string(), value)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.fields.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn mark(&self, marker: &mut Marker) {
        self.fields.values().for_each(|v| marker.mark(v));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Shared native payload stored in a ref field
pub type RefValue = Arc<dyn Any + Send + Sync>;

/// Native values owned by a native object. Not traced.
#[derive(Default)]
pub struct RefFields {
    fields: HashMap<String, RefValue>,
}

impl RefFields {
    pub fn set(&mut self, key: &str, value: RefValue) -> Option<RefValue> {
        self.fields.insert(key.to_string(), value)
    }

    pub fn get(&self, key: &str) -> Option<RefValue> {
        self.fields.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<RefValue> {
        self.fields.remove(key)
    }
}

/// Listener subscriptions per property
#[derive(Default)]
pub struct SignalRegistry {
    next_token: u32,
    listeners: BTreeMap<String, Vec<(u32, Value)>>,
}

impl SignalRegistry {
    /// Record a listener. Tokens start at 1 and never repeat.
    pub fn subscribe(&mut self, prop: &str, listener: Value) -> u32 {
        self.next_token = self.next_token.wrapping_add(1).max(1);
        let token = self.next_token;
        self.listeners.entry(prop.to_string()).or_default().push((token, listener));
        token
    }

    /// Remove listeners and return them. A token or function removes the
    /// first match only.
    pub fn unsubscribe(&mut self, prop: &str, which: &Unsubscribe) -> Vec<Value> {
        let Some(list) = self.listeners.get_mut(prop) else {
            return Vec::new();
        };
        let removed = match which {
            Unsubscribe::All => list.drain(..).map(|(_, f)| f).collect(),
            Unsubscribe::Token(t) => list
                .iter()
                .position(|(token, _)| token == t)
                .map(|i| vec![list.remove(i).1])
                .unwrap_or_default(),
            Unsubscribe::Function(f) => list
                .iter()
                .position(|(_, listener)| listener == f)
                .map(|i| vec![list.remove(i).1])
                .unwrap_or_default(),
        };
        if list.is_empty() {
            self.listeners.remove(prop);
        }
        removed
    }

    /// Remove the listener holding `token`, whatever its property
    pub fn remove_token(&mut self, token: u32) -> Option<Value> {
        let prop = self
            .listeners
            .iter()
            .find(|(_, list)| list.iter().any(|(t, _)| *t == token))
            .map(|(prop, _)| prop.clone())?;
        self.unsubscribe(&prop, &Unsubscribe::Token(token)).pop()
    }

    /// Remove every listener
    pub fn clear(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.listeners)
            .into_values()
            .flat_map(|list| list.into_iter().map(|(_, f)| f))
            .collect()
    }

    /// Snapshot of the listeners for `prop`
    pub fn listeners(&self, prop: &str) -> Vec<Value> {
        self.listeners
            .get(prop)
            .map(|list| list.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default()
    }

    pub fn mark(&self, marker: &mut Marker) {
        for list in self.listeners.values() {
            list.iter().for_each(|(_, f)| marker.mark(f));
        }
    }

    pub fn count(&self, prop: &str) -> usize {
        self.listeners.get(prop).map_or(0, Vec::len)
    }
}

/// Which listeners to drop
#[derive(Debug, Clone, PartialEq)]
pub enum Unsubscribe {
    All,
    Token(u32),
    Function(Value),
}

/// Extra mark hook registered on a native object
pub type GcMarkHook = Arc<dyn Fn(&NativeObject, &mut Marker) + Send + Sync>;

/// One-shot hook run during detach
pub type GcCollectHook = Box<dyn FnOnce(&NativeObject, &Context) + Send>;

/// Hooks registered through `hook_gc_mark` / `hook_gc_collect`
#[derive(Default)]
pub struct GcHookRegistry {
    pub(crate) mark_hooks: Vec<GcMarkHook>,
    pub(crate) collect_hooks: Vec<GcCollectHook>,
}

/// The tables one template owns
#[derive(Default)]
pub struct SideTables {
    pub values: SideTable<ValueFields>,
    pub refs: SideTable<RefFields>,
    pub signals: SideTable<SignalRegistry>,
    pub gc_hooks: SideTable<GcHookRegistry>,
    pub executors: SideTable<Arc<AsyncExecutor>>,
}
