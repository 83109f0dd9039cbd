//! Object classes
//!
//! A class gives objects a native payload (the opaque slot) and two hooks:
//! a mark hook called while tracing and a finalizer called after an object
//! of the class has been collected.

use std::any::Any;
use std::rc::Rc;

use crate::context::Context;
use crate::value::{ObjectId, Value};

/// Native payload stored in an object's opaque slot
pub type Opaque = Rc<dyn Any>;

/// Called once with the payload of a collected object
pub type Finalizer = Rc<dyn Fn(&Context, Opaque)>;

/// Reports values reachable from a payload. Must only call [`Marker::mark`].
pub type GcMark = Rc<dyn Fn(&dyn Any, &mut Marker)>;

/// Registered class index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// Class of plain objects
    pub const OBJECT: ClassId = ClassId(0);
}

/// Class registration
#[derive(Clone)]
pub struct ClassDef {
    pub name: String,
    pub finalizer: Option<Finalizer>,
    pub gc_mark: Option<GcMark>,
}

impl ClassDef {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), finalizer: None, gc_mark: None }
    }

    pub fn finalizer(mut self, f: impl Fn(&Context, Opaque) + 'static) -> Self {
        self.finalizer = Some(Rc::new(f));
        self
    }

    pub fn gc_mark(mut self, f: impl Fn(&dyn Any, &mut Marker) + 'static) -> Self {
        self.gc_mark = Some(Rc::new(f));
        self
    }
}

impl std::fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("finalizer", &self.finalizer.is_some())
            .field("gc_mark", &self.gc_mark.is_some())
            .finish()
    }
}

/// Tracing visitor handed to mark hooks
#[derive(Debug, Default)]
pub struct Marker {
    pub(crate) found: Vec<ObjectId>,
}

impl Marker {
    pub fn mark(&mut self, value: &Value) {
        if let Value::Object(id) = value {
            self.found.push(*id);
        }
    }
}
