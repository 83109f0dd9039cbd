//! JSON text serializer

use std::fmt::Write;

use crate::tree::{Node, ValueTree};

impl ValueTree {
    /// Serialize to JSON text. Binary payloads serialize as `null`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        dump_into(self, &mut out);
        out
    }
}

fn dump_into(value: &ValueTree, out: &mut String) {
    match value.node() {
        Node::Null | Node::Binary(_) => out.push_str("null"),
        Node::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Node::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Node::Double(v) => dump_double(*v, out),
        Node::String(s) => dump_string(s, out),
        Node::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                dump_into(item, out);
            }
            out.push(']');
        }
        Node::Object(items) => {
            out.push('{');
            for (i, (key, item)) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                dump_string(key, out);
                out.push_str(": ");
                dump_into(item, out);
            }
            out.push('}');
        }
    }
}

fn dump_double(v: f64, out: &mut String) {
    if v.is_finite() {
        // Debug keeps the ".0" on integral values so they re-parse as Double
        let _ = write!(out, "{v:?}");
    } else {
        out.push_str("null");
    }
}

fn dump_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) <= 0x1f => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Object, ParseStrategy};

    #[test]
    fn test_dump_scalars() {
        assert_eq!(ValueTree::null().dump(), "null");
        assert_eq!(ValueTree::from(true).dump(), "true");
        assert_eq!(ValueTree::from(-42).dump(), "-42");
        assert_eq!(ValueTree::from(2.0).dump(), "2.0");
        assert_eq!(ValueTree::from(0.1).dump(), "0.1");
        assert_eq!(ValueTree::from(f64::NAN).dump(), "null");
        assert_eq!(ValueTree::from(f64::INFINITY).dump(), "null");
    }

    #[test]
    fn test_dump_escapes() {
        let v = ValueTree::from("q\"b\\\n\u{01}\u{2028}\u{2029}é");
        assert_eq!(v.dump(), r#""q\"b\\\n\u0001\u2028\u2029é""#);
    }

    #[test]
    fn test_dump_containers() {
        let mut obj = Object::new();
        obj.insert("b".into(), ValueTree::from(vec![ValueTree::from(1), ValueTree::null()]));
        obj.insert("a".into(), ValueTree::from("x"));
        assert_eq!(ValueTree::from(obj).dump(), r#"{"a": "x", "b": [1, null]}"#);
    }

    #[test]
    fn test_binary_dumps_as_null() {
        let bin = ValueTree::binary(vec![1, 2, 3]);
        assert_eq!(bin.dump(), "null");
        let back = ValueTree::parse(&bin.dump(), ParseStrategy::Standard).unwrap();
        assert!(back.is_null());
        assert_ne!(back, bin);
    }

    #[test]
    fn test_integral_double_round_trips_as_double() {
        let v = ValueTree::from(1e21);
        let back = ValueTree::parse(&v.dump(), ParseStrategy::Standard).unwrap();
        assert_eq!(back, v);
        let v = ValueTree::from(3.0);
        assert_eq!(ValueTree::parse(&v.dump(), ParseStrategy::Standard).unwrap(), v);
    }
}
