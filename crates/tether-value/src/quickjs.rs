//! QuickJS bridge
//!
//! Converts between [`ValueTree`] and `rquickjs` values so hosts that embed
//! QuickJS directly can reuse the same marshaling type.

use rquickjs::{ArrayBuffer, Ctx, IntoJs, Object, Value};

use crate::tree::{Array, Node, Object as TreeObject, ValueTree};

/// Build a QuickJS value from a tree
pub fn to_quickjs<'js>(ctx: &Ctx<'js>, tree: &ValueTree) -> rquickjs::Result<Value<'js>> {
    match tree.node() {
        Node::Null => Ok(Value::new_null(ctx.clone())),
        Node::Bool(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        Node::Int(v) => Ok(Value::new_int(ctx.clone(), *v)),
        Node::Double(v) => Ok(Value::new_float(ctx.clone(), *v)),
        Node::String(s) => s.as_str().into_js(ctx),
        Node::Binary(bytes) => ArrayBuffer::new(ctx.clone(), bytes.clone())?.into_js(ctx),
        Node::Array(items) => {
            let array = rquickjs::Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, to_quickjs(ctx, item)?)?;
            }
            Ok(array.into_value())
        }
        Node::Object(items) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in items {
                object.set(key.as_str(), to_quickjs(ctx, item)?)?;
            }
            Ok(object.into_value())
        }
    }
}

/// Read a tree back from a QuickJS value. Functions and symbols become null.
pub fn from_quickjs(value: &Value<'_>) -> rquickjs::Result<ValueTree> {
    if value.is_null() || value.is_undefined() {
        return Ok(ValueTree::null());
    }
    if let Some(b) = value.as_bool() {
        return Ok(b.into());
    }
    if let Some(i) = value.as_int() {
        return Ok(i.into());
    }
    if let Some(f) = value.as_float() {
        return Ok(f.into());
    }
    if let Some(s) = value.as_string() {
        return Ok(s.to_string()?.into());
    }
    if let Some(array) = value.as_array() {
        let mut items = Array::with_capacity(array.len());
        for i in 0..array.len() {
            let item: Value<'_> = array.get(i)?;
            items.push(from_quickjs(&item)?);
        }
        return Ok(items.into());
    }
    if let Some(object) = value.as_object() {
        if let Some(buffer) = ArrayBuffer::from_object(object.clone()) {
            return Ok(ValueTree::binary(buffer.as_bytes().unwrap_or_default()));
        }
        if value.is_function() {
            return Ok(ValueTree::null());
        }
        let mut items = TreeObject::new();
        for prop in object.props::<String, Value<'_>>() {
            let (key, item) = prop?;
            items.insert(key, from_quickjs(&item)?);
        }
        return Ok(items.into());
    }
    Ok(ValueTree::null())
}
