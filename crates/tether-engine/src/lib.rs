//! tether engine
//!
//! The embedded script engine the binding layer is written against, plus a
//! small single-threaded implementation of it. The engine offers:
//!
//! - objects with an opaque native slot and a class id
//! - class registration with finalizer and GC-mark callbacks
//! - atom-keyed properties (data and accessor) with flags
//! - native functions bound to fixed reference data slots
//! - promise capabilities, exceptions, and a mark-and-sweep collector
//! - a job queue that other threads post onto ([`JsHandler`])
//!
//! A [`Context`] is `!Send`: everything that touches script values runs on
//! the thread that owns it. [`Value`] handles are plain data and may cross
//! threads, but may only be dereferenced through the owning context.
//!
//! Collection only happens inside [`Context::run_gc`]. Values that must
//! survive a collection have to be reachable from the global object, pinned
//! with [`Context::dup_value`], or reported by a class mark hook.

mod value;
mod atom;
mod object;
mod heap;
mod class;
mod function;
mod context;
mod gc;
mod handler;

pub use value::{ObjectId, Value};
pub use atom::{Atom, IntoAtom};
pub use object::{PromiseState, PropertyFlags};
pub use class::{ClassDef, ClassId, Finalizer, GcMark, Marker, Opaque};
pub use function::{Invocation, NativeFn};
pub use context::{Context, ErrorKind};
pub use gc::GcStats;
pub use handler::{JsHandler, JsTask};

/// Engine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A script exception is pending; take it with [`Context::catch`]
    #[error("script exception pending")]
    Exception,
    #[error("value is not an object")]
    NotAnObject,
    #[error("object was collected")]
    StaleObject,
    #[error("engine job queue is closed")]
    JobQueueClosed,
}

/// Engine result
pub type Result<T> = std::result::Result<T, Error>;
