//! Round-trip tests - parse(dump(v)) == v for every text-representable shape

use tether_value::{Kind, Object, ParseStrategy, ValueTree, MAX_DEPTH};

fn reparse(v: &ValueTree) -> ValueTree {
    ValueTree::parse(&v.dump(), ParseStrategy::Standard).expect("dump output must parse")
}

// ============================================================================
// SCALARS
// ============================================================================

#[test]
fn test_scalar_round_trip() {
    let samples = [
        ValueTree::null(),
        ValueTree::from(true),
        ValueTree::from(false),
        ValueTree::from(0),
        ValueTree::from(-99_999_999),
        ValueTree::from(0.25),
        ValueTree::from(-1.0e-9),
        ValueTree::from(12345.0),
        ValueTree::from(""),
        ValueTree::from("plain"),
        ValueTree::from("tab\tquote\"slash\\nul\u{0}sep\u{2028}"),
        ValueTree::from("日本語 🎉"),
    ];
    for v in &samples {
        assert_eq!(&reparse(v), v, "round trip failed for {}", v.dump());
    }
}

// ============================================================================
// CONTAINERS
// ============================================================================

#[test]
fn test_nested_round_trip() {
    let mut inner = Object::new();
    inner.insert("z".into(), ValueTree::from(vec![ValueTree::from(1.5), ValueTree::null()]));
    inner.insert("".into(), ValueTree::from("empty key"));

    let mut outer = Object::new();
    outer.insert("inner".into(), ValueTree::from(inner));
    outer.insert("list".into(), vec![ValueTree::from(Object::new()), ValueTree::from(Vec::<ValueTree>::new())].into());

    let v = ValueTree::from(outer);
    assert_eq!(reparse(&v), v);
}

#[test]
fn test_deepest_accepted_round_trip() {
    let mut v = ValueTree::from(7);
    for _ in 0..MAX_DEPTH {
        v = vec![v].into();
    }
    assert_eq!(reparse(&v), v);

    let too_deep: ValueTree = vec![v].into();
    let err = ValueTree::parse(&too_deep.dump(), ParseStrategy::Standard).unwrap_err();
    assert!(err.to_string().contains("maximum nesting depth"));
}

// ============================================================================
// DOCUMENTED LOSSY CASES
// ============================================================================

#[test]
fn test_binary_is_not_round_trippable() {
    let mut obj = Object::new();
    obj.insert("blob".into(), ValueTree::binary(b"\x00\x01".to_vec()));
    let v = ValueTree::from(obj);
    let back = reparse(&v);
    assert!(back["blob"].is_null());
    assert_ne!(back, v);
}

#[test]
fn test_non_finite_double_is_null() {
    let v: ValueTree = vec![ValueTree::from(f64::NEG_INFINITY)].into();
    assert!(reparse(&v)[0].is_null());
}

#[test]
fn test_wide_int_reparses_as_double() {
    // ten or more characters exceed the Int digit limit
    for n in [i32::MAX, i32::MIN, 1_000_000_000] {
        let v = reparse(&ValueTree::from(n));
        assert_eq!(v.kind(), Kind::Double, "{n}");
        assert_eq!(v.number_value(), f64::from(n));
        assert_ne!(v, ValueTree::from(n));
    }
    assert_eq!(reparse(&ValueTree::from(-99_999_999)).kind(), Kind::Int);
}
