#![no_main]

use libfuzzer_sys::fuzz_target;
use sbc_decoder::Decoder;
use sbc_tests::{KitchenSink, TreeNode};
use sbc_types::CodecOptions;

// Fuzz target: buffered decode of arbitrary bytes.
//
// Catches bugs in:
// - Hostile length prefixes and element counts
// - Malformed presence flags and member keys
// - Unknown runtime type names
// - Deep nesting
//
// Byte 0 selects the framing options; the rest is the payload.
fuzz_target!(|data: &[u8]| {
    let Some((&mode, payload)) = data.split_first() else {
        return;
    };
    let options = CodecOptions::default()
        .with_member_names(mode & 1 != 0)
        .with_runtime_types(mode & 2 != 0)
        .with_max_preallocation(64);
    let decoder = Decoder::new(options);
    let _ = decoder.decode::<KitchenSink>(payload);
    let _ = decoder.decode::<TreeNode>(payload);
});
