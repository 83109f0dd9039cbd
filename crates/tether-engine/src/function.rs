//! Native functions

use std::rc::Rc;

use crate::context::Context;
use crate::value::Value;
use crate::Result;

/// Arguments of one native function call
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub this: &'a Value,
    pub args: &'a [Value],
    /// Integer fixed at function creation
    pub magic: i32,
    /// Reference slots fixed at function creation
    pub data: &'a [Value],
    /// Set when invoked with `new`
    pub new_target: Option<&'a Value>,
}

impl Invocation<'_> {
    /// Argument at `index`, or undefined
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Reference slot at `index`, or undefined
    pub fn data(&self, index: usize) -> Value {
        self.data.get(index).cloned().unwrap_or_default()
    }

    pub fn is_constructor_call(&self) -> bool {
        self.new_target.is_some()
    }
}

/// Native function body
pub type NativeFn = Rc<dyn Fn(&Context, &Invocation<'_>) -> Result<Value>>;
