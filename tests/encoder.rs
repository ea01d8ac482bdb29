use galley::encode::{CIRCULAR_PLACEHOLDER, MAX_DEPTH, MAX_DEPTH_PLACEHOLDER, encode};
use galley::error::AccessFault;
use galley::value::{HostHandle, HostRef, ObjectRef, RawValue, SequenceRef};
use proptest::prelude::*;
use serde_json::Value;

/// Build a chain of nested sequences so that `leaf` sits at the given
/// nesting depth (the root sequence is depth 0, its item depth 1, ...).
fn leaf_at_depth(depth: usize, leaf: RawValue) -> RawValue {
    let mut value = leaf;
    for _ in 0..depth {
        let seq = SequenceRef::new();
        seq.push(value);
        value = RawValue::Sequence(seq);
    }
    value
}

#[test]
fn flat_aggregate_renders_in_insertion_order() {
    let items = SequenceRef::from_items(vec![
        RawValue::from(1i64),
        RawValue::Null,
        RawValue::from("x"),
    ]);
    let obj = ObjectRef::new();
    obj.insert("a", 1i64);
    obj.insert("b", "quote\"me");
    obj.insert("c", items);
    assert_eq!(
        encode(&RawValue::Object(obj)),
        r#"{"a":1,"b":"quote\"me","c":[1,null,"x"]}"#
    );
}

#[test]
fn self_cycle_renders_the_circular_placeholder() {
    let obj = ObjectRef::new();
    obj.insert("name", "root");
    obj.insert("self", obj.clone());
    let encoded = encode(&RawValue::Object(obj));
    assert_eq!(encoded, r#"{"name":"root","self":"[circular]"}"#);
    serde_json::from_str::<Value>(&encoded).expect("circular output still parses");
}

#[test]
fn mutual_cycle_is_cut_exactly_once_per_path() {
    let a = ObjectRef::new();
    let b = ObjectRef::new();
    a.insert("b", b.clone());
    b.insert("a", a.clone());
    assert_eq!(encode(&RawValue::Object(a)), r#"{"b":{"a":"[circular]"}}"#);
}

#[test]
fn shared_structure_is_not_mistaken_for_a_cycle() {
    let shared = SequenceRef::from_items(vec![RawValue::from(1i64), RawValue::from(2i64)]);
    let root = SequenceRef::from_items(vec![
        RawValue::Sequence(shared.clone()),
        RawValue::Sequence(shared),
    ]);
    // Post-order pop means the second visit encodes in full.
    assert_eq!(encode(&RawValue::Sequence(root)), "[[1,2],[1,2]]");
}

#[test]
fn depth_cutoff_sits_between_twenty_and_twenty_one() {
    let at_limit = leaf_at_depth(MAX_DEPTH, RawValue::from("deep"));
    let encoded = encode(&at_limit);
    assert!(encoded.contains("\"deep\""), "depth 20 still renders: {encoded}");
    assert!(!encoded.contains(MAX_DEPTH_PLACEHOLDER));

    let past_limit = leaf_at_depth(MAX_DEPTH + 1, RawValue::from("deep"));
    let encoded = encode(&past_limit);
    assert!(!encoded.contains("\"deep\""));
    assert!(encoded.contains(MAX_DEPTH_PLACEHOLDER));
    serde_json::from_str::<Value>(&encoded).expect("cut output still parses");
}

#[test]
fn callable_in_a_sequence_keeps_its_slot() {
    let seq = SequenceRef::from_items(vec![
        RawValue::from(1i64),
        RawValue::Callable,
        RawValue::from(3i64),
    ]);
    assert_eq!(encode(&RawValue::Sequence(seq)), "[1,null,3]");
}

#[test]
fn callable_member_is_omitted_key_and_all() {
    let obj = ObjectRef::new();
    obj.insert("width", 100i64);
    obj.insert("resize", RawValue::Callable);
    obj.insert("height", 50i64);
    assert_eq!(
        encode(&RawValue::Object(obj)),
        r#"{"width":100,"height":50}"#
    );
}

#[test]
fn unreadable_member_is_dropped_without_sinking_its_siblings() {
    let obj = ObjectRef::new();
    obj.insert("ok", true);
    obj.insert_unreadable("guarded", AccessFault::new("read raised host-side"));
    obj.insert("also_ok", "still here");
    assert_eq!(
        encode(&RawValue::Object(obj)),
        r#"{"ok":true,"also_ok":"still here"}"#
    );
}

#[test]
fn identity_fault_makes_the_value_an_opaque_null() {
    let poisoned = ObjectRef::new();
    poisoned.insert("never", "seen");
    poisoned.set_identity_fault(AccessFault::new("class probe raised"));
    let seq = SequenceRef::from_items(vec![
        RawValue::from("before"),
        RawValue::Object(poisoned),
        RawValue::from("after"),
    ]);
    assert_eq!(
        encode(&RawValue::Sequence(seq)),
        r#"["before",null,"after"]"#
    );
}

#[test]
fn host_objects_render_their_specifier_tag_without_property_walks() {
    let live = RawValue::Host(HostRef::new(HostHandle::new(
        "Rectangle",
        "/document[0]/rectangle[3]",
    )));
    assert_eq!(encode(&live), r#""[HOST:Rectangle:/document[0]/rectangle[3]]""#);

    let no_spec = RawValue::Host(HostRef::new(HostHandle::from_probes(
        Some("Story".to_string()),
        None,
    )));
    assert_eq!(encode(&no_spec), r#""[HOST object]""#);

    let no_class = RawValue::Host(HostRef::new(HostHandle::from_probes(None, None)));
    assert_eq!(encode(&no_class), "null");
}

#[test]
fn mixed_scalars_keep_slots_and_escapes() {
    let c = SequenceRef::from_items(vec![
        RawValue::from(1i64),
        RawValue::Number(f64::NAN),
        RawValue::Absent,
    ]);
    let obj = ObjectRef::new();
    obj.insert("a", 1i64);
    obj.insert("b", "x\"y");
    obj.insert("c", c);
    assert_eq!(
        encode(&RawValue::Object(obj)),
        r#"{"a":1,"b":"x\"y","c":[1,null,null]}"#
    );
}

#[test]
fn non_finite_numbers_render_null_even_inside_aggregates() {
    let obj = ObjectRef::new();
    obj.insert("nan", RawValue::Number(f64::NAN));
    obj.insert("inf", RawValue::Number(f64::INFINITY));
    obj.insert("neg", RawValue::Number(f64::NEG_INFINITY));
    obj.insert("fine", 1.5);
    assert_eq!(
        encode(&RawValue::Object(obj)),
        r#"{"nan":null,"inf":null,"neg":null,"fine":1.5}"#
    );
}

#[test]
fn keys_are_escaped_like_any_other_string() {
    let obj = ObjectRef::new();
    obj.insert("line\nbreak", 1i64);
    let encoded = encode(&RawValue::Object(obj));
    assert_eq!(encoded, r#"{"line\nbreak":1}"#);
    serde_json::from_str::<Value>(&encoded).expect("escaped key parses");
}

#[test]
fn everything_at_once_still_yields_valid_json() {
    let obj = ObjectRef::new();
    obj.insert("self", obj.clone());
    obj.insert("deep", leaf_at_depth(MAX_DEPTH + 5, RawValue::Null));
    obj.insert("nan", RawValue::Number(f64::NAN));
    obj.insert("fn", RawValue::Callable);
    obj.insert_unreadable("guarded", AccessFault::new("no"));
    obj.insert(
        "frame",
        RawValue::Host(HostRef::new(HostHandle::new("TextFrame", "/frame[0]"))),
    );
    let encoded = encode(&RawValue::Object(obj));
    let parsed: Value = serde_json::from_str(&encoded).expect("hostile graph still parses");
    assert_eq!(parsed["self"], CIRCULAR_PLACEHOLDER);
    assert_eq!(parsed["nan"], Value::Null);
    assert!(parsed.get("fn").is_none(), "callable member must be omitted");
    assert!(parsed.get("guarded").is_none(), "unreadable member must be omitted");
    assert_eq!(parsed["frame"], "[HOST:TextFrame:/frame[0]]");
}

/// Convert a plain JSON tree into the equivalent raw value graph.
fn raw_from_json(value: &Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Bool(*b),
        Value::Number(n) => RawValue::Number(n.as_f64().expect("test numbers fit f64")),
        Value::String(s) => RawValue::from(s.as_str()),
        Value::Array(items) => {
            let seq = SequenceRef::new();
            for item in items {
                seq.push(raw_from_json(item));
            }
            RawValue::Sequence(seq)
        }
        Value::Object(map) => {
            let obj = ObjectRef::new();
            for (key, item) in map {
                obj.insert(key.clone(), raw_from_json(item));
            }
            RawValue::Object(obj)
        }
    }
}

fn arb_clean_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        // Integers keep serde_json's number representation stable for
        // the equality check; float formatting has its own property.
        any::<i32>().prop_map(Value::from),
        ".*".prop_map(Value::from),
    ];
    leaf.prop_recursive(4, 32, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::btree_map(".*", inner, 0..5)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    /// For clean acyclic graphs the defensive encoder agrees with an
    /// ordinary JSON serializer.
    #[test]
    fn clean_graphs_round_trip_through_serde(json in arb_clean_json()) {
        let encoded = encode(&raw_from_json(&json));
        let parsed: Value = serde_json::from_str(&encoded).expect("encoder output parses");
        prop_assert_eq!(parsed, json);
    }

    /// Finite numbers render with enough precision to reparse to the
    /// exact same bits.
    #[test]
    fn finite_numbers_reparse_exactly(n in any::<f64>().prop_filter("finite", |n| n.is_finite())) {
        let encoded = encode(&RawValue::Number(n));
        let parsed: f64 = encoded.parse().expect("number output parses");
        prop_assert_eq!(parsed.to_bits(), n.to_bits());
    }

    /// Any text at all escapes into a parseable JSON string equal to
    /// the original.
    #[test]
    fn text_escaping_round_trips(s in ".*") {
        let encoded = encode(&RawValue::from(s.as_str()));
        let parsed: String = serde_json::from_str(&encoded).expect("string output parses");
        prop_assert_eq!(parsed, s);
    }
}
