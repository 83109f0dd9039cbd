//! serde integration

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::tree::{Array, Node, Object, ValueTree};

impl Serialize for ValueTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.node() {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Int(v) => serializer.serialize_i32(*v),
            Node::Double(v) => serializer.serialize_f64(*v),
            Node::String(s) => serializer.serialize_str(s),
            Node::Binary(bytes) => serializer.serialize_bytes(bytes),
            Node::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Object(items) => {
                let mut map = serializer.serialize_map(Some(items.len()))?;
                for (key, item) in items {
                    map.serialize_entry(key, item)?;
                }
                map.end()
            }
        }
    }
}

struct TreeVisitor;

impl<'de> Visitor<'de> for TreeVisitor {
    type Value = ValueTree;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON-like value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<ValueTree, E> {
        Ok(ValueTree::null())
    }

    fn visit_none<E: de::Error>(self) -> Result<ValueTree, E> {
        Ok(ValueTree::null())
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<ValueTree, D::Error> {
        ValueTree::deserialize(d)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ValueTree, E> {
        Ok(v.into())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ValueTree, E> {
        Ok(match i32::try_from(v) {
            Ok(small) => small.into(),
            Err(_) => (v as f64).into(),
        })
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ValueTree, E> {
        Ok(match i32::try_from(v) {
            Ok(small) => small.into(),
            Err(_) => (v as f64).into(),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ValueTree, E> {
        Ok(v.into())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ValueTree, E> {
        Ok(v.into())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<ValueTree, E> {
        Ok(v.into())
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<ValueTree, E> {
        Ok(ValueTree::binary(v))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<ValueTree, E> {
        Ok(ValueTree::binary(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ValueTree, A::Error> {
        let mut items = Array::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(items.into())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ValueTree, A::Error> {
        let mut items = Object::new();
        while let Some((key, value)) = map.next_entry::<String, ValueTree>()? {
            items.insert(key, value);
        }
        Ok(items.into())
    }
}

impl<'de> Deserialize<'de> for ValueTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TreeVisitor)
    }
}
