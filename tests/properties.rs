use material_forge::generator::{Value, ValueType};
use material_forge::graph::{Graph, Node, NodeTypeId};
use proptest::prelude::*;
use proptest::sample::select;

const ALL_TYPES: [ValueType; 11] = [
    ValueType::Bool,
    ValueType::Int,
    ValueType::Uint,
    ValueType::Float,
    ValueType::Float2,
    ValueType::Float3,
    ValueType::Float4,
    ValueType::Quaternion,
    ValueType::Matrix,
    ValueType::Object,
    ValueType::Void,
];

fn value_type() -> impl Strategy<Value = ValueType> {
    select(ALL_TYPES.to_vec())
}

/// A valid value: either a literal or an opaque identifier.
fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        (value_type(), "[A-Z][a-z]{0,6}[0-9]{0,2}").prop_map(|(ty, name)| Value::new(ty, name)),
        (-1000.0f32..1000.0).prop_map(Value::float),
        prop::array::uniform3(-10.0f32..10.0).prop_map(Value::float3),
        any::<i32>().prop_map(Value::int),
        any::<bool>().prop_map(Value::bool),
    ]
}

proptest! {
    #[test]
    fn cast_always_yields_the_target_kind(v in value(), to in value_type()) {
        prop_assume!(!matches!(to, ValueType::Object | ValueType::Void));
        let out = v.cast(to);
        prop_assert_eq!(out.ty, to);
        prop_assert!(out.is_valid(), "{:?} -> {:?} gave an empty expression", v, to);
    }

    #[test]
    fn cast_to_same_kind_is_identity(v in value()) {
        prop_assert_eq!(v.cast(v.ty), v.clone());
    }

    #[test]
    fn widest_is_commutative(a in value_type(), b in value_type()) {
        prop_assert_eq!(ValueType::widest(a, b), ValueType::widest(b, a));
    }

    #[test]
    fn edits_keep_connections_symmetric(
        edits in proptest::collection::vec((1u32..=4, 0u32..3, 1u32..=4, 0u32..3, any::<bool>()), 0..40)
    ) {
        let mut g = Graph::new();
        for id in 1..=4 {
            let node = Node::new(id, NodeTypeId::new(5, 20))
                .with_box(0, ValueType::Float)
                .with_box(1, ValueType::Float)
                .with_box(2, ValueType::Float);
            g.add_node(node).unwrap();
        }
        for (an, ab, bn, bb, connect) in edits {
            let a = g.box_ref(an, ab).unwrap();
            let b = g.box_ref(bn, bb).unwrap();
            if connect {
                g.connect(a, b);
            } else {
                g.disconnect(a, b);
            }
            prop_assert!(g.connections_are_symmetric());
        }
        let reloaded = Graph::from_json_str(&g.to_json().unwrap()).unwrap();
        prop_assert!(!reloaded.deprecated);
        prop_assert!(reloaded.graph.connections_are_symmetric());
    }
}
