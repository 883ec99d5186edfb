//! Round-trip tests: encode a value, decode it back, compare.
//!
//! Every fixture is exercised under each combination of the framing
//! options (member names, runtime types, index width, text encoding), so
//! a decoder that disagrees with the encoder about any piece of framing
//! in any mode shows up here.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use proptest::prelude::*;
use sbc_decoder::Decoder;
use sbc_encoder::Encoder;
use sbc_tests::{Address, Annotated, Color, Drawing, KitchenSink, Person, TreeNode};
use sbc_types::{CodecOptions, PlanResolver, Reflect, TypeRef};
use sbc_wire::{IndexWidth, TextEncoding};

/// All framing configurations worth distinguishing.
fn all_options() -> Vec<CodecOptions> {
    let mut out = Vec::new();
    for names in [false, true] {
        for types in [false, true] {
            for width in [IndexWidth::One, IndexWidth::Two] {
                for encoding in [TextEncoding::Utf8, TextEncoding::Utf16] {
                    out.push(
                        CodecOptions::default()
                            .with_member_names(names)
                            .with_runtime_types(types)
                            .with_index_width(width)
                            .with_text_encoding(encoding),
                    );
                }
            }
        }
    }
    out
}

fn roundtrip_with<T: Reflect + PartialEq + Debug>(options: &CodecOptions, value: &T) -> T {
    let resolver = Arc::new(PlanResolver::new());
    let bytes = Encoder::with_resolver(Arc::clone(&resolver), options.clone())
        .encode(value)
        .unwrap_or_else(|e| panic!("encode failed under {options:?}: {e}"));
    Decoder::with_resolver(resolver, options.clone())
        .decode::<T>(&bytes)
        .unwrap_or_else(|e| panic!("decode failed under {options:?}: {e}"))
}

fn assert_roundtrip<T: Reflect + PartialEq + Debug>(value: &T) {
    for options in all_options() {
        assert_eq!(&roundtrip_with(&options, value), value, "options: {options:?}");
    }
}

// ── Scalars ───────────────────────────────────────────────────────────────────

#[test]
fn integer_extremes() {
    assert_roundtrip(&i8::MIN);
    assert_roundtrip(&i8::MAX);
    assert_roundtrip(&u8::MAX);
    assert_roundtrip(&i16::MIN);
    assert_roundtrip(&u16::MAX);
    assert_roundtrip(&i32::MIN);
    assert_roundtrip(&u32::MAX);
    assert_roundtrip(&i64::MIN);
    assert_roundtrip(&u64::MAX);
    assert_roundtrip(&0i32);
}

#[test]
fn floats_including_specials() {
    assert_roundtrip(&f32::MIN_POSITIVE);
    assert_roundtrip(&f64::MAX);
    assert_roundtrip(&-0.0f64);
    assert_roundtrip(&f64::INFINITY);

    let options = CodecOptions::default();
    assert!(roundtrip_with(&options, &f32::NAN).is_nan());
}

#[test]
fn text_and_chars() {
    assert_roundtrip(&String::new());
    assert_roundtrip(&String::from("naïve café ✓ 日本"));
    assert_roundtrip(&'\u{0}');
    assert_roundtrip(&'\u{FFFF}');
}

#[test]
fn nullable_scalars() {
    assert_roundtrip(&Some(0u8));
    assert_roundtrip(&None::<u8>);
    assert_roundtrip(&Some(String::new()));
    assert_roundtrip(&None::<String>);
    assert_roundtrip(&Some(Color::Green));
    assert_roundtrip(&None::<Color>);
}

#[test]
fn type_refs() {
    assert_roundtrip(&TypeRef::of::<Person>());
    assert_roundtrip(&TypeRef::null());
}

// ── Containers ────────────────────────────────────────────────────────────────

#[test]
fn sequences() {
    assert_roundtrip(&Vec::<i32>::new());
    assert_roundtrip(&vec![Some(1i64), None, Some(-1)]);
    assert_roundtrip(&vec![vec![String::from("a")], vec![]]);
    assert_roundtrip(&Some(vec![1u8, 2, 3]));
    assert_roundtrip(&None::<Vec<u8>>);
}

#[test]
fn maps() {
    assert_roundtrip(&BTreeMap::<String, i32>::new());
    assert_roundtrip(&BTreeMap::from([(1i32, None), (2, Some(String::from("two")))]));
    assert_roundtrip(&HashMap::from([(
        String::from("home"),
        Address {
            street: String::from("Elm"),
            zip: Some(12345),
        },
    )]));
}

// ── Composites ────────────────────────────────────────────────────────────────

#[test]
fn person() {
    assert_roundtrip(&Person {
        name: String::from("Alice"),
        age: 30,
        tags: vec![String::from("a"), String::from("b")],
    });
    assert_roundtrip(&Person::default());
}

#[test]
fn nullable_composites() {
    assert_roundtrip(&Some(Address::default()));
    assert_roundtrip(&None::<Address>);
    assert_roundtrip(&vec![None, Some(Address::default())]);
}

#[test]
fn every_category_in_one_value() {
    assert_roundtrip(&KitchenSink::sample());
    assert_roundtrip(&KitchenSink::default());
}

#[test]
fn recursive_tree() {
    assert_roundtrip(&TreeNode::complete(4, 3));
}

#[test]
fn annotated_members() {
    let value = Annotated {
        first: 9,
        second: String::from("two"),
        skipped: 0,
        cache: None,
    };
    assert_roundtrip(&value);
}

#[test]
fn polymorphic_members_need_runtime_types() {
    let options = CodecOptions::default().with_runtime_types(true);
    let resolver = Arc::new(PlanResolver::new());
    resolver.register::<sbc_tests::Circle>();
    resolver.register::<sbc_tests::Rect>();

    let bytes = Encoder::with_resolver(Arc::clone(&resolver), options.clone())
        .encode(&Drawing::sample())
        .unwrap();
    let decoded: Drawing = Decoder::with_resolver(resolver, options).decode(&bytes).unwrap();
    assert_eq!(decoded, Drawing::sample());
    let total: f64 = decoded.shapes.iter().map(|s| s.area()).sum();
    assert!(total > 6.0);
}

// ── Property-based ────────────────────────────────────────────────────────────

fn arb_person() -> impl Strategy<Value = Person> {
    (".{0,16}", any::<i32>(), prop::collection::vec(".{0,8}", 0..6))
        .prop_map(|(name, age, tags)| Person { name, age, tags })
}

fn arb_tree() -> impl Strategy<Value = TreeNode> {
    let leaf = any::<i32>().prop_map(|value| TreeNode {
        value,
        children: Vec::new(),
    });
    leaf.prop_recursive(4, 32, 4, |inner| {
        (any::<i32>(), prop::collection::vec(inner, 0..4))
            .prop_map(|(value, children)| TreeNode { value, children })
    })
}

proptest! {
    #[test]
    fn arbitrary_people_roundtrip(person in arb_person(), names in any::<bool>(), types in any::<bool>()) {
        let options = CodecOptions::default()
            .with_member_names(names)
            .with_runtime_types(types);
        prop_assert_eq!(roundtrip_with(&options, &person), person);
    }

    #[test]
    fn arbitrary_trees_roundtrip(tree in arb_tree()) {
        prop_assert_eq!(roundtrip_with(&CodecOptions::default(), &tree), tree);
    }

    #[test]
    fn arbitrary_maps_roundtrip(map in prop::collection::btree_map(any::<i16>(), prop::option::of(".{0,4}"), 0..8)) {
        prop_assert_eq!(roundtrip_with(&CodecOptions::default(), &map), map);
    }
}
