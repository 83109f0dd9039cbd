//! Interned property keys

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;

/// Interned property key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub(crate) u32);

impl Atom {
    pub fn id(&self) -> u32 {
        self.0
    }
}

/// Anything usable as a property key
pub trait IntoAtom {
    fn into_atom(self, ctx: &Context) -> Atom;
}

impl IntoAtom for Atom {
    fn into_atom(self, _ctx: &Context) -> Atom {
        self
    }
}

impl IntoAtom for &str {
    fn into_atom(self, ctx: &Context) -> Atom {
        ctx.atom(self)
    }
}

impl IntoAtom for &String {
    fn into_atom(self, ctx: &Context) -> Atom {
        ctx.atom(self)
    }
}

/// Atoms live as long as the context
#[derive(Default)]
pub(crate) struct AtomTable {
    ids: HashMap<Arc<str>, Atom>,
    names: Vec<Arc<str>>,
}

impl AtomTable {
    pub fn intern(&mut self, name: &str) -> Atom {
        if let Some(atom) = self.ids.get(name) {
            return *atom;
        }
        let atom = Atom(self.names.len() as u32);
        let name: Arc<str> = Arc::from(name);
        self.names.push(Arc::clone(&name));
        self.ids.insert(name, atom);
        atom
    }

    pub fn name(&self, atom: Atom) -> Arc<str> {
        self.names
            .get(atom.0 as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut table = AtomTable::default();
        let a = table.intern("on");
        let b = table.intern("off");
        assert_ne!(a, b);
        assert_eq!(table.intern("on"), a);
        assert_eq!(&*table.name(b), "off");
    }
}
