//! ValueTree and engine value conversion

use tether_engine::{Context, ErrorKind, Value};
use tether_value::{Array, Kind, Object, ParseStrategy, ValueTree, MAX_DEPTH};

/// Build an engine value from a tree. Binary payloads become array buffers.
pub fn value_tree_to_js(ctx: &Context, tree: &ValueTree) -> Value {
    match tree.kind() {
        Kind::Null => Value::Null,
        Kind::Bool => Value::Bool(tree.bool_value()),
        Kind::Int => Value::Int(tree.int_value()),
        Kind::Double => Value::Float(tree.number_value()),
        Kind::String => Value::from(tree.string_value()),
        Kind::Binary => ctx.new_array_buffer(tree.binary_items().to_vec()),
        Kind::Array => {
            let items = tree.array_items().iter().map(|item| value_tree_to_js(ctx, item)).collect();
            ctx.new_array(items)
        }
        Kind::Object => {
            let object = ctx.new_object();
            for (key, item) in tree.object_items() {
                let value = value_tree_to_js(ctx, item);
                // fresh object, the write cannot fail
                let _ = ctx.set_property(&object, key, value);
            }
            object
        }
    }
}

/// Read a tree from an engine value.
///
/// Undefined and functions become null inside arrays and are skipped as
/// object members. Nesting past [`MAX_DEPTH`] (including cycles) is cut off
/// with null.
pub fn js_to_value_tree(ctx: &Context, value: &Value) -> ValueTree {
    to_tree(ctx, value, 0)
}

fn to_tree(ctx: &Context, value: &Value, depth: usize) -> ValueTree {
    match value {
        Value::Undefined | Value::Null => ValueTree::null(),
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Float(f) => (*f).into(),
        Value::String(s) => ValueTree::from(&**s),
        Value::Object(_) => {
            if depth >= MAX_DEPTH || ctx.is_function(value) {
                return ValueTree::null();
            }
            if let Some(bytes) = ctx.array_buffer_bytes(value) {
                return ValueTree::binary(bytes);
            }
            if ctx.is_array(value) {
                let len = ctx.array_len(value).unwrap_or(0);
                let items: Array = (0..len)
                    .map(|i| to_tree(ctx, &ctx.array_get(value, i).unwrap_or_default(), depth + 1))
                    .collect();
                return items.into();
            }
            let mut members = Object::new();
            for atom in ctx.own_keys(value).unwrap_or_default() {
                let Ok(member) = ctx.get_property(value, atom) else {
                    // a throwing getter leaves its exception pending
                    ctx.dump_pending();
                    continue;
                };
                if member.is_undefined() || ctx.is_function(&member) {
                    continue;
                }
                members.insert(ctx.atom_name(atom).to_string(), to_tree(ctx, &member, depth + 1));
            }
            members.into()
        }
    }
}

/// Parse JSON text into an engine value. A parse failure throws a SyntaxError.
pub fn json_to_js(ctx: &Context, text: &str) -> tether_engine::Result<Value> {
    match ValueTree::parse(text, ParseStrategy::Standard) {
        Ok(tree) => Ok(value_tree_to_js(ctx, &tree)),
        Err(e) => Err(ctx.throw_error(ErrorKind::Syntax, &e.to_string())),
    }
}

/// Serialize every argument, as default async parameters
pub fn args_to_params(ctx: &Context, args: &[Value]) -> Vec<ValueTree> {
    args.iter().map(|arg| js_to_value_tree(ctx, arg)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_to_js_and_back() {
        let ctx = Context::new();
        let tree = ValueTree::parse(
            r#"{"name": "lamp", "on": true, "level": 3, "ratio": 0.5, "tags": ["a", null]}"#,
            ParseStrategy::Standard,
        )
        .unwrap();
        let value = value_tree_to_js(&ctx, &tree);
        assert_eq!(ctx.get_property(&value, "level").unwrap(), Value::Int(3));
        assert_eq!(js_to_value_tree(&ctx, &value), tree);
    }

    #[test]
    fn test_functions_and_undefined_dropped() {
        let ctx = Context::new();
        let obj = ctx.new_object();
        let f = ctx.new_function("f", 0, 0, vec![], |_, _| Ok(Value::Undefined));
        ctx.set_property(&obj, "f", f.clone()).unwrap();
        ctx.set_property(&obj, "u", Value::Undefined).unwrap();
        ctx.set_property(&obj, "list", ctx.new_array(vec![f, Value::Int(1)])).unwrap();
        let tree = js_to_value_tree(&ctx, &obj);
        assert_eq!(tree.to_string(), r#"{"list": [null, 1]}"#);
    }

    #[test]
    fn test_cycle_is_cut_off() {
        let ctx = Context::new();
        let obj = ctx.new_object();
        ctx.set_property(&obj, "self", obj.clone()).unwrap();
        let tree = js_to_value_tree(&ctx, &obj);
        assert!(tree.is_object());
    }

    #[test]
    fn test_binary_becomes_array_buffer() {
        let ctx = Context::new();
        let value = value_tree_to_js(&ctx, &ValueTree::binary(vec![1, 2, 3]));
        assert_eq!(ctx.array_buffer_bytes(&value), Some(vec![1, 2, 3]));
        assert_eq!(js_to_value_tree(&ctx, &value), ValueTree::binary(vec![1, 2, 3]));
    }

    #[test]
    fn test_bad_json_throws_syntax_error() {
        let ctx = Context::new();
        assert!(json_to_js(&ctx, "{oops").is_err());
        let exc = ctx.catch();
        assert_eq!(ctx.get_property(&exc, "name").unwrap(), Value::from("SyntaxError"));
    }
}
