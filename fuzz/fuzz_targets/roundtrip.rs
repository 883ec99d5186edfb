#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sbc_decoder::Decoder;
use sbc_encoder::Encoder;
use sbc_tests::{Address, Person, TreeNode};
use sbc_types::CodecOptions;
use sbc_wire::{IndexWidth, TextEncoding};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    member_names: bool,
    runtime_types: bool,
    wide_indices: bool,
    utf16: bool,
    name: String,
    age: i32,
    tags: Vec<String>,
    addresses: BTreeMap<String, (String, Option<u32>)>,
    tree: Vec<(i32, u8)>,
}

impl FuzzInput {
    fn options(&self) -> CodecOptions {
        let width = if self.wide_indices {
            IndexWidth::Two
        } else {
            IndexWidth::One
        };
        let encoding = if self.utf16 {
            TextEncoding::Utf16
        } else {
            TextEncoding::Utf8
        };
        CodecOptions::default()
            .with_member_names(self.member_names)
            .with_runtime_types(self.runtime_types)
            .with_index_width(width)
            .with_text_encoding(encoding)
    }

    /// Builds a tree by attaching each node under an earlier one.
    fn tree(&self) -> TreeNode {
        let mut nodes: Vec<TreeNode> = self
            .tree
            .iter()
            .map(|&(value, _)| TreeNode {
                value,
                children: Vec::new(),
            })
            .collect();
        while nodes.len() > 1 {
            let Some(node) = nodes.pop() else { break };
            let parent = usize::from(self.tree[nodes.len()].1) % nodes.len();
            nodes[parent].children.push(node);
        }
        nodes.pop().unwrap_or_default()
    }
}

// Fuzz target: encode→decode roundtrip under arbitrary framing options.
fuzz_target!(|input: FuzzInput| {
    let options = input.options();
    let encoder = Encoder::new(options.clone());
    let decoder = Decoder::new(options);

    let person = Person {
        name: input.name.clone(),
        age: input.age,
        tags: input.tags.clone(),
    };
    let bytes = encoder.encode(&person).unwrap();
    assert_eq!(decoder.decode::<Person>(&bytes).unwrap(), person);

    let addresses: BTreeMap<String, Address> = input
        .addresses
        .iter()
        .map(|(k, (street, zip))| {
            (
                k.clone(),
                Address {
                    street: street.clone(),
                    zip: *zip,
                },
            )
        })
        .collect();
    let bytes = encoder.encode(&addresses).unwrap();
    assert_eq!(decoder.decode::<BTreeMap<String, Address>>(&bytes).unwrap(), addresses);

    let tree = input.tree();
    let bytes = encoder.encode(&tree).unwrap();
    assert_eq!(decoder.decode::<TreeNode>(&bytes).unwrap(), tree);
});
