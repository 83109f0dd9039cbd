//! Value tree node

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;
use std::sync::{Arc, OnceLock};

/// Array payload
pub type Array = Vec<ValueTree>;

/// Object payload (keys are kept sorted)
pub type Object = BTreeMap<String, ValueTree>;

/// Variant tag, in comparison order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Kind {
    Null = 0,
    Bool = 1,
    Int = 2,
    Double = 3,
    String = 4,
    Array = 5,
    Object = 6,
    Binary = 7,
}

#[derive(Debug)]
pub(crate) enum Node {
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Array(Array),
    Object(Object),
    Binary(Vec<u8>),
}

/// Immutable tagged-union value, shared by reference counting
#[derive(Clone)]
pub struct ValueTree(Arc<Node>);

static NULL: OnceLock<ValueTree> = OnceLock::new();
static EMPTY_ARRAY: Array = Vec::new();
static EMPTY_OBJECT: Object = BTreeMap::new();

impl ValueTree {
    /// The shared null value
    pub fn null() -> Self {
        Self::null_ref().clone()
    }

    pub(crate) fn null_ref() -> &'static ValueTree {
        NULL.get_or_init(|| ValueTree(Arc::new(Node::Null)))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_node(Node::Binary(bytes.into()))
    }

    pub(crate) fn from_node(node: Node) -> Self {
        match node {
            Node::Null => Self::null(),
            node => ValueTree(Arc::new(node)),
        }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.0
    }

    /// Variant tag
    pub fn kind(&self) -> Kind {
        match *self.0 {
            Node::Null => Kind::Null,
            Node::Bool(_) => Kind::Bool,
            Node::Int(_) => Kind::Int,
            Node::Double(_) => Kind::Double,
            Node::String(_) => Kind::String,
            Node::Array(_) => Kind::Array,
            Node::Object(_) => Kind::Object,
            Node::Binary(_) => Kind::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        self.kind() == Kind::Null
    }

    pub fn is_bool(&self) -> bool {
        self.kind() == Kind::Bool
    }

    /// True for both Int and Double
    pub fn is_number(&self) -> bool {
        matches!(self.kind(), Kind::Int | Kind::Double)
    }

    pub fn is_string(&self) -> bool {
        self.kind() == Kind::String
    }

    pub fn is_array(&self) -> bool {
        self.kind() == Kind::Array
    }

    pub fn is_object(&self) -> bool {
        self.kind() == Kind::Object
    }

    pub fn is_binary(&self) -> bool {
        self.kind() == Kind::Binary
    }

    /// Numeric value of Int or Double, 0.0 otherwise
    pub fn number_value(&self) -> f64 {
        match *self.0 {
            Node::Int(v) => f64::from(v),
            Node::Double(v) => v,
            _ => 0.0,
        }
    }

    /// Integer value of Int or Double (truncated), 0 otherwise
    pub fn int_value(&self) -> i32 {
        match *self.0 {
            Node::Int(v) => v,
            Node::Double(v) => v as i32,
            _ => 0,
        }
    }

    pub fn bool_value(&self) -> bool {
        matches!(*self.0, Node::Bool(true))
    }

    pub fn string_value(&self) -> &str {
        match &*self.0 {
            Node::String(s) => s,
            _ => "",
        }
    }

    pub fn array_items(&self) -> &Array {
        match &*self.0 {
            Node::Array(items) => items,
            _ => &EMPTY_ARRAY,
        }
    }

    pub fn object_items(&self) -> &Object {
        match &*self.0 {
            Node::Object(items) => items,
            _ => &EMPTY_OBJECT,
        }
    }

    pub fn binary_items(&self) -> &[u8] {
        match &*self.0 {
            Node::Binary(bytes) => bytes,
            _ => &[],
        }
    }

    /// Element at `index`, or null
    pub fn get(&self, index: usize) -> &ValueTree {
        self.array_items().get(index).unwrap_or_else(|| Self::null_ref())
    }

    /// Member `key`, or null
    pub fn member(&self, key: &str) -> &ValueTree {
        self.object_items().get(key).unwrap_or_else(|| Self::null_ref())
    }

    /// True when both point at the same shared node
    pub fn ptr_eq(&self, other: &ValueTree) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for ValueTree {
    fn default() -> Self {
        Self::null()
    }
}

impl Index<usize> for ValueTree {
    type Output = ValueTree;

    fn index(&self, index: usize) -> &ValueTree {
        self.get(index)
    }
}

impl Index<&str> for ValueTree {
    type Output = ValueTree;

    fn index(&self, key: &str) -> &ValueTree {
        self.member(key)
    }
}

impl Ord for ValueTree {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.ptr_eq(other) {
            return Ordering::Equal;
        }
        match (&*self.0, &*other.0) {
            (Node::Null, Node::Null) => Ordering::Equal,
            (Node::Bool(a), Node::Bool(b)) => a.cmp(b),
            (Node::Int(a), Node::Int(b)) => a.cmp(b),
            (Node::Double(a), Node::Double(b)) => a.total_cmp(b),
            (Node::String(a), Node::String(b)) => a.cmp(b),
            (Node::Array(a), Node::Array(b)) => a.cmp(b),
            (Node::Object(a), Node::Object(b)) => a.cmp(b),
            (Node::Binary(a), Node::Binary(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl PartialOrd for ValueTree {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ValueTree {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ValueTree {}

impl fmt::Debug for ValueTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Node::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
            _ => f.write_str(&self.dump()),
        }
    }
}

impl fmt::Display for ValueTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

impl From<bool> for ValueTree {
    fn from(v: bool) -> Self {
        Self::from_node(Node::Bool(v))
    }
}

impl From<i32> for ValueTree {
    fn from(v: i32) -> Self {
        Self::from_node(Node::Int(v))
    }
}

impl From<f64> for ValueTree {
    fn from(v: f64) -> Self {
        Self::from_node(Node::Double(v))
    }
}

impl From<&str> for ValueTree {
    fn from(v: &str) -> Self {
        Self::from_node(Node::String(v.to_string()))
    }
}

impl From<String> for ValueTree {
    fn from(v: String) -> Self {
        Self::from_node(Node::String(v))
    }
}

impl From<Array> for ValueTree {
    fn from(v: Array) -> Self {
        Self::from_node(Node::Array(v))
    }
}

impl From<Object> for ValueTree {
    fn from(v: Object) -> Self {
        Self::from_node(Node::Object(v))
    }
}

impl From<()> for ValueTree {
    fn from(_: ()) -> Self {
        Self::null()
    }
}

impl<T: Into<ValueTree>> From<Option<T>> for ValueTree {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

impl FromIterator<ValueTree> for ValueTree {
    fn from_iter<I: IntoIterator<Item = ValueTree>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Array>())
    }
}

impl<K: Into<String>> FromIterator<(K, ValueTree)> for ValueTree {
    fn from_iter<I: IntoIterator<Item = (K, ValueTree)>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(|(k, v)| (k.into(), v)).collect::<Object>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_shared() {
        let a = ValueTree::null();
        let b = ValueTree::from(());
        assert!(a.ptr_eq(&b));
        assert!(ValueTree::default().is_null());
    }

    #[test]
    fn test_accessors_default_on_mismatch() {
        let s = ValueTree::from("hi");
        assert_eq!(s.number_value(), 0.0);
        assert_eq!(s.int_value(), 0);
        assert!(!s.bool_value());
        assert!(s.array_items().is_empty());
        assert!(s.object_items().is_empty());
        assert!(s.binary_items().is_empty());
        assert_eq!(ValueTree::from(3).string_value(), "");
    }

    #[test]
    fn test_index_missing_is_null() {
        let arr: ValueTree = vec![ValueTree::from(1)].into();
        assert_eq!(arr[0].int_value(), 1);
        assert!(arr[5].is_null());
        assert!(arr["x"].is_null());

        let obj: ValueTree = [("a", ValueTree::from(true))].into_iter().collect();
        assert!(obj["a"].bool_value());
        assert!(obj["b"].is_null());
        assert!(obj[0].is_null());
    }

    #[test]
    fn test_cross_type_ordering_by_tag() {
        let null = ValueTree::null();
        let b = ValueTree::from(false);
        let i = ValueTree::from(100);
        let d = ValueTree::from(-1.5);
        let s = ValueTree::from("");
        assert!(null < b);
        assert!(b < i);
        assert!(i < d);
        assert!(d < s);
        assert!(s < ValueTree::from(Array::new()));
        assert!(ValueTree::from(Object::new()) < ValueTree::binary(vec![]));
    }

    #[test]
    fn test_int_and_double_differ() {
        assert_ne!(ValueTree::from(1), ValueTree::from(1.0));
        assert_eq!(ValueTree::from(1.0), ValueTree::from(1.0));
        assert_eq!(ValueTree::from("x"), ValueTree::from(String::from("x")));
    }

    #[test]
    fn test_option_conversion() {
        assert!(ValueTree::from(None::<i32>).is_null());
        assert_eq!(ValueTree::from(Some("v")).string_value(), "v");
    }
}
