/// Property-based checks for the two universal JSON invariants named in the
/// design: `parse(serialize(v)) == v` and `serialize(v).len() == v.size()`,
/// plus the chunk-boundary independence of the streaming parser.
use proptest::prelude::*;
use pubsubd::json::{parse_complete, parse_split, Value};

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::number(n as i64)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::string),
    ];

    leaf.prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::array),
            prop::collection::vec(("[a-zA-Z][a-zA-Z0-9]{0,6}", inner), 0..5).prop_map(|pairs| {
                Value::object(pairs.into_iter().collect::<Vec<_>>())
            }),
        ]
    })
}

proptest! {
    #[test]
    fn round_trip_is_identity(v in arb_value()) {
        let text = v.serialize();
        let reparsed = parse_complete(text.as_bytes()).unwrap();
        prop_assert_eq!(reparsed, v);
    }

    #[test]
    fn size_matches_serialized_length(v in arb_value()) {
        prop_assert_eq!(v.size(), v.serialize().len());
    }

    #[test]
    fn any_chunk_split_matches_one_shot_parse(v in arb_value()) {
        let text = v.serialize();
        let whole = parse_complete(text.as_bytes()).unwrap();
        for at in 0..=text.len() {
            let split = parse_split(text.as_bytes(), at).unwrap();
            prop_assert_eq!(split, whole.clone());
        }
    }
}
