#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use sbc_decoder::{DecodeEngine, Decoder, Progress};
use sbc_tests::KitchenSink;
use sbc_types::{CodecOptions, PlanResolver};

// Fuzz target: the frame engine must agree with the buffered decoder.
//
// Input format:
//   byte 0: framing options
//   byte 1: chunk size
//   bytes 2..: payload
//
// Feeds the payload to the engine in chunks and asserts that success,
// consumed length and (on success) the decoded value match a buffered
// decode of the same bytes.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let options = CodecOptions::default()
        .with_member_names(data[0] & 1 != 0)
        .with_runtime_types(data[0] & 2 != 0)
        .with_max_preallocation(64);
    let chunk = usize::from(data[1]).max(1);
    let payload = &data[2..];

    let resolver = Arc::new(PlanResolver::new());
    let buffered = Decoder::with_resolver(Arc::clone(&resolver), options.clone())
        .decode_prefix::<KitchenSink>(payload);

    let engine = DecodeEngine::new(Arc::clone(&resolver), options.clone());
    let plan = resolver.resolve::<KitchenSink>(&options).unwrap();
    let mut state = engine.begin(&plan).unwrap();
    let mut window = Vec::new();
    let mut offset = 0;
    let mut fed = 0;
    let chunked = loop {
        let take = chunk.min(payload.len() - fed);
        window.extend_from_slice(&payload[fed..fed + take]);
        fed += take;
        match engine.advance(&mut state, &window, fed == payload.len()) {
            Ok(Progress::Complete { value, consumed }) => {
                let value = *value.downcast::<KitchenSink>().unwrap();
                break Ok((value, offset + consumed));
            }
            Ok(Progress::NeedMore { consumed, .. }) => {
                offset += consumed;
                window = window.split_off(consumed);
            }
            Err(err) => break Err(err),
        }
    };

    match (buffered, chunked) {
        (Ok(a), Ok(b)) => assert_eq!(a, b),
        (Err(_), Err(_)) => {}
        (a, b) => panic!("paths disagree: buffered {a:?}, chunked {b:?}"),
    }
});
