//! Heap objects

use std::ops::BitOr;

use crate::atom::Atom;
use crate::class::{ClassId, Opaque};
use crate::function::NativeFn;
use crate::value::{ObjectId, Value};

/// Property attribute bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyFlags(u8);

impl PropertyFlags {
    pub const NONE: Self = Self(0);
    pub const WRITABLE: Self = Self(1);
    pub const ENUMERABLE: Self = Self(2);
    pub const CONFIGURABLE: Self = Self(4);
    pub const ALL: Self = Self(7);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for PropertyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone)]
pub(crate) enum Slot {
    Data(Value),
    Accessor { getter: Option<Value>, setter: Option<Value> },
}

#[derive(Clone)]
pub(crate) struct Property {
    pub slot: Slot,
    pub flags: PropertyFlags,
}

/// Promise settlement state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

pub(crate) struct FunctionData {
    pub callback: NativeFn,
    pub magic: i32,
    pub data: Vec<Value>,
    pub constructor: bool,
}

pub(crate) enum ObjectKind {
    Plain,
    Array(Vec<Value>),
    Function(FunctionData),
    Error,
    Promise { state: PromiseState, result: Value },
    ArrayBuffer(Vec<u8>),
}

pub(crate) struct HeapObject {
    pub kind: ObjectKind,
    pub class: ClassId,
    pub opaque: Option<Opaque>,
    pub proto: Option<ObjectId>,
    pub props: Vec<(Atom, Property)>,
    /// External strong references (dup/free)
    pub pins: u32,
}

impl HeapObject {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            class: ClassId::OBJECT,
            opaque: None,
            proto: None,
            props: Vec::new(),
            pins: 0,
        }
    }

    pub fn find(&self, atom: Atom) -> Option<&Property> {
        self.props.iter().find(|(a, _)| *a == atom).map(|(_, p)| p)
    }

    pub fn find_mut(&mut self, atom: Atom) -> Option<&mut Property> {
        self.props.iter_mut().find(|(a, _)| *a == atom).map(|(_, p)| p)
    }

    /// Insert or replace an own property
    pub fn define(&mut self, atom: Atom, property: Property) {
        match self.find_mut(atom) {
            Some(existing) => *existing = property,
            None => self.props.push((atom, property)),
        }
    }

    pub fn remove(&mut self, atom: Atom) -> Option<Property> {
        let pos = self.props.iter().position(|(a, _)| *a == atom)?;
        Some(self.props.remove(pos).1)
    }

    /// Object ids directly referenced by this object
    pub fn children(&self, out: &mut Vec<ObjectId>) {
        let mut push = |v: &Value| {
            if let Value::Object(id) = v {
                out.push(*id);
            }
        };
        for (_, prop) in &self.props {
            match &prop.slot {
                Slot::Data(v) => push(v),
                Slot::Accessor { getter, setter } => {
                    getter.iter().chain(setter.iter()).for_each(&mut push);
                }
            }
        }
        match &self.kind {
            ObjectKind::Array(items) => items.iter().for_each(&mut push),
            ObjectKind::Function(f) => f.data.iter().for_each(&mut push),
            ObjectKind::Promise { result, .. } => push(result),
            ObjectKind::Plain | ObjectKind::Error | ObjectKind::ArrayBuffer(_) => {}
        }
        if let Some(proto) = self.proto {
            out.push(proto);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let f = PropertyFlags::WRITABLE | PropertyFlags::ENUMERABLE;
        assert!(f.contains(PropertyFlags::WRITABLE));
        assert!(!f.contains(PropertyFlags::CONFIGURABLE));
        assert_eq!(PropertyFlags::from_bits(0xff), PropertyFlags::ALL);
    }

    #[test]
    fn test_define_replaces() {
        let mut obj = HeapObject::new(ObjectKind::Plain);
        let key = Atom(3);
        obj.define(key, Property { slot: Slot::Data(Value::Int(1)), flags: PropertyFlags::ALL });
        obj.define(key, Property { slot: Slot::Data(Value::Int(2)), flags: PropertyFlags::ALL });
        assert_eq!(obj.props.len(), 1);
        assert!(matches!(obj.find(key).map(|p| &p.slot), Some(Slot::Data(Value::Int(2)))));
    }
}
