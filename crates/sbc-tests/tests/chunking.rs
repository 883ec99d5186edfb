//! Chunked-input tests: the frame engine and the streaming drivers must
//! produce exactly what the buffered decoder produces, however the input
//! is split.

use std::fmt::Debug;
use std::sync::Arc;

use proptest::prelude::*;
use sbc_decoder::{BlockingDecoder, DecodeEngine, DecodeError, Decoder, Progress, StreamingDecoder};
use sbc_encoder::Encoder;
use sbc_tests::{AsyncChunkedReader, ChunkedReader, Circle, Drawing, KitchenSink, Person, PersonV2, Rect, TreeNode};
use sbc_types::{CodecOptions, PlanResolver, Reflect};

const CHUNK_SIZES: [usize; 5] = [1, 2, 3, 7, 64];

fn encode<T: Reflect>(options: &CodecOptions, resolver: &Arc<PlanResolver>, value: &T) -> Vec<u8> {
    Encoder::with_resolver(Arc::clone(resolver), options.clone())
        .encode(value)
        .unwrap()
}

/// Drive the engine directly, handing it `chunk` new bytes per call.
fn engine_decode<T: Reflect>(
    options: &CodecOptions,
    resolver: &Arc<PlanResolver>,
    bytes: &[u8],
    chunk: usize,
) -> Result<T, DecodeError> {
    let engine = DecodeEngine::new(Arc::clone(resolver), options.clone());
    let plan = resolver.resolve::<T>(options)?;
    let mut state = engine.begin(&plan)?;
    let mut window: Vec<u8> = Vec::new();
    let mut rest = bytes;
    loop {
        let take = chunk.min(rest.len());
        window.extend_from_slice(&rest[..take]);
        rest = &rest[take..];
        match engine.advance(&mut state, &window, rest.is_empty())? {
            Progress::Complete { value, consumed } => {
                assert_eq!(consumed, window.len(), "engine left bytes unread");
                return Ok(*value.downcast::<T>().unwrap());
            }
            Progress::NeedMore { consumed, .. } => {
                window = window.split_off(consumed);
            }
        }
    }
}

fn assert_all_paths_agree<T: Reflect + PartialEq + Debug>(options: &CodecOptions, resolver: &Arc<PlanResolver>, value: &T) {
    let bytes = encode(options, resolver, value);
    let buffered: T = Decoder::with_resolver(Arc::clone(resolver), options.clone())
        .decode(&bytes)
        .unwrap();
    assert_eq!(&buffered, value);

    for chunk in CHUNK_SIZES {
        let from_engine: T = engine_decode(options, resolver, &bytes, chunk).unwrap();
        assert_eq!(from_engine, buffered, "engine, chunk {chunk}");

        let small_buffer = options.clone().with_initial_buffer_size(chunk);
        let mut blocking = BlockingDecoder::new(ChunkedReader::new(&bytes, chunk), Arc::clone(resolver), small_buffer);
        let from_reader: T = blocking.next().unwrap().unwrap();
        assert_eq!(from_reader, buffered, "blocking, chunk {chunk}");
        assert!(blocking.next::<T>().is_none());
    }
}

#[test]
fn scalars_and_text() {
    let options = CodecOptions::default();
    let resolver = Arc::new(PlanResolver::new());
    assert_all_paths_agree(&options, &resolver, &u64::MAX);
    assert_all_paths_agree(&options, &resolver, &String::from("split me across many reads"));
    assert_all_paths_agree(&options, &resolver, &Some(String::new()));
    assert_all_paths_agree(&options, &resolver, &None::<i32>);
}

#[test]
fn composites_in_every_mode() {
    for names in [false, true] {
        for types in [false, true] {
            let options = CodecOptions::default()
                .with_member_names(names)
                .with_runtime_types(types);
            let resolver = Arc::new(PlanResolver::new());
            assert_all_paths_agree(&options, &resolver, &KitchenSink::sample());
            assert_all_paths_agree(&options, &resolver, &TreeNode::complete(3, 2));
        }
    }
}

#[test]
fn polymorphic_values() {
    let options = CodecOptions::default().with_runtime_types(true);
    let resolver = Arc::new(PlanResolver::new());
    resolver.register::<Circle>();
    resolver.register::<Rect>();
    assert_all_paths_agree(&options, &resolver, &Drawing::sample());
}

#[test]
fn drained_members_match_buffered() {
    let options = CodecOptions::default().with_runtime_types(true);
    let writer = Arc::new(PlanResolver::new());
    let v2 = PersonV2 {
        name: String::from("Bo"),
        age: 7,
        tags: vec![String::from("x")],
        email: Some(String::from("bo@example.com")),
        scores: vec![1, 2, 3],
        home: Some(sbc_tests::Address {
            street: String::from("Oak"),
            zip: Some(9),
        }),
    };
    let bytes = encode(&options, &writer, &v2);

    let reader = Arc::new(PlanResolver::new());
    reader.register::<sbc_tests::Address>();
    reader.register::<Vec<i32>>();
    let buffered: Person = Decoder::with_resolver(Arc::clone(&reader), options.clone())
        .decode(&bytes)
        .unwrap();
    assert_eq!(buffered, v2.as_v1());
    for chunk in CHUNK_SIZES {
        let chunked: Person = engine_decode(&options, &reader, &bytes, chunk).unwrap();
        assert_eq!(chunked, buffered, "chunk {chunk}");
    }
}

#[test]
fn successive_values_share_one_stream() {
    let options = CodecOptions::default();
    let resolver = Arc::new(PlanResolver::new());
    let people: Vec<Person> = (0..5)
        .map(|i| Person {
            name: format!("p{i}"),
            age: i,
            tags: vec![String::from("t"); usize::try_from(i).unwrap()],
        })
        .collect();
    let encoder = Encoder::with_resolver(Arc::clone(&resolver), options.clone());
    let mut bytes = Vec::new();
    for person in &people {
        encoder.encode_into(person, &mut bytes).unwrap();
    }

    for chunk in CHUNK_SIZES {
        let mut blocking = BlockingDecoder::new(ChunkedReader::new(&bytes, chunk), Arc::clone(&resolver), options.clone());
        let mut decoded = Vec::new();
        while let Some(person) = blocking.next::<Person>() {
            decoded.push(person.unwrap());
        }
        assert_eq!(decoded, people, "chunk {chunk}");
    }
}

#[tokio::test]
async fn async_driver_matches_buffered() {
    let options = CodecOptions::default().with_member_names(true);
    let resolver = Arc::new(PlanResolver::new());
    let value = KitchenSink::sample();
    let bytes = encode(&options, &resolver, &value);

    for chunk in CHUNK_SIZES {
        let small_buffer = options.clone().with_initial_buffer_size(chunk);
        let mut stream = StreamingDecoder::new(AsyncChunkedReader::new(&bytes, chunk), Arc::clone(&resolver), small_buffer);
        let decoded: KitchenSink = stream.next().await.unwrap().unwrap();
        assert_eq!(decoded, value, "chunk {chunk}");
        assert!(stream.next::<KitchenSink>().await.is_none());
    }
}

#[tokio::test]
async fn async_one_shot_from_reader() {
    let options = CodecOptions::default();
    let person = Person {
        name: String::from("Alice"),
        age: 30,
        tags: vec![String::from("a")],
    };
    let bytes = Encoder::new(options.clone()).encode(&person).unwrap();
    let decoder = Decoder::new(options);
    let decoded: Person = decoder
        .decode_from_async_reader(AsyncChunkedReader::new(&bytes, 3))
        .await
        .unwrap();
    assert_eq!(decoded, person);
}

// ── Truncation ────────────────────────────────────────────────────────────────

#[test]
fn every_proper_prefix_is_truncated() {
    let options = CodecOptions::default();
    let resolver = Arc::new(PlanResolver::new());
    let bytes = encode(&options, &resolver, &KitchenSink::sample());
    let decoder = Decoder::with_resolver(Arc::clone(&resolver), options.clone());

    for len in 0..bytes.len() {
        let prefix = &bytes[..len];
        let buffered = decoder.decode::<KitchenSink>(prefix).unwrap_err();
        assert!(matches!(buffered, DecodeError::Truncated { .. }), "buffered, len {len}: {buffered}");

        let chunked = engine_decode::<KitchenSink>(&options, &resolver, prefix, 5).unwrap_err();
        assert!(matches!(chunked, DecodeError::Truncated { .. }), "engine, len {len}: {chunked}");
    }
}

#[test]
fn clean_end_between_values_is_not_an_error() {
    let options = CodecOptions::default();
    let resolver = Arc::new(PlanResolver::new());
    let bytes = encode(&options, &resolver, &7u16);
    let mut blocking = BlockingDecoder::new(ChunkedReader::new(&bytes, 1), resolver, options);
    assert_eq!(blocking.next::<u16>().unwrap().unwrap(), 7);
    assert!(blocking.next::<u16>().is_none());
}

#[test]
fn end_inside_a_value_is_truncated() {
    let options = CodecOptions::default();
    let resolver = Arc::new(PlanResolver::new());
    let mut bytes = encode(&options, &resolver, &vec![1u32, 2]);
    bytes.pop();
    let mut blocking = BlockingDecoder::new(ChunkedReader::new(&bytes, 2), resolver, options);
    let err = blocking.next::<Vec<u32>>().unwrap().unwrap_err();
    assert!(matches!(err, DecodeError::Truncated { needed: 1 }));
}

proptest! {
    #[test]
    fn any_chunk_size_matches_buffered(
        name in ".{0,24}",
        tags in prop::collection::vec(".{0,6}", 0..5),
        chunk in 1usize..40,
        names in any::<bool>(),
    ) {
        let options = CodecOptions::default().with_member_names(names);
        let resolver = Arc::new(PlanResolver::new());
        let person = Person { name, age: -3, tags };
        let bytes = encode(&options, &resolver, &person);
        let decoded: Person = engine_decode(&options, &resolver, &bytes, chunk).unwrap();
        prop_assert_eq!(decoded, person);
    }
}
