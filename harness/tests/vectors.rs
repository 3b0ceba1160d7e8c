// SPDX-License-Identifier: CC0-1.0

use std::process::Command;

use hex::prelude::*;
use seedstream::chacha::block;
use seedstream::Rounds;
use seedstream_harness::{write_vector, write_vectors, Vector, VECTORS};

const REFERENCE: &str = include_str!("../../seedstream/tests/data/chacha_vectors.txt");

#[test]
fn dump_reproduces_reference_vectors() {
    let mut out = Vec::new();
    write_vectors(&mut out).unwrap();
    let dump = String::from_utf8(out).unwrap();
    assert_eq!(dump, REFERENCE);
}

#[test]
fn unaligned_offset_dumps_whole_blocks() {
    let aligned = Vector {
        key: [1; 32],
        nonce: [2; 8],
        offset: 128,
    };
    let unaligned = Vector {
        offset: 150,
        ..aligned
    };
    let mut a = Vec::new();
    let mut b = Vec::new();
    write_vector(&mut a, &aligned, seedstream::Rounds::ChaCha12).unwrap();
    write_vector(&mut b, &unaligned, seedstream::Rounds::ChaCha12).unwrap();
    let a = String::from_utf8(a).unwrap();
    let b = String::from_utf8(b).unwrap();
    // Only the offset line differs.
    let differing: Vec<(&str, &str)> = a.lines().zip(b.lines()).filter(|(x, y)| x != y).collect();
    assert_eq!(differing, vec![("offset: 128", "offset: 150")]);
    assert_eq!(VECTORS.len() * 3 * 21, REFERENCE.lines().count());
}

fn dump_keystream(args: &[&str]) -> Vec<u8> {
    let output = Command::new(env!("CARGO_BIN_EXE_dump_keystream"))
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success());
    output.stdout
}

#[test]
fn binary_prints_reference_vectors() {
    assert_eq!(String::from_utf8(dump_keystream(&[])).unwrap(), REFERENCE);
}

#[test]
fn binary_streams_raw_keystream() {
    let key: [u8; 32] = core::array::from_fn(|i| i as u8);
    let nonce = [0x4a, 0, 0, 0, 0, 0, 0, 0x09];
    let key_hex = key[..].to_lower_hex_string();
    let nonce_hex = nonce[..].to_lower_hex_string();
    let raw = |offset: &str| {
        dump_keystream(&[
            "--raw",
            "--rounds",
            "12",
            "--key",
            &key_hex,
            "--nonce",
            &nonce_hex,
            "--offset",
            offset,
            "--length",
            "64",
        ])
    };

    // Offset 128 is exactly block 2.
    let aligned = raw("128");
    assert_eq!(aligned, block(&key, 2, &nonce, Rounds::ChaCha12));

    let unaligned = raw("160");
    let mut expected = block(&key, 2, &nonce, Rounds::ChaCha12)[32..].to_vec();
    expected.extend_from_slice(&block(&key, 3, &nonce, Rounds::ChaCha12)[..32]);
    assert_eq!(unaligned, expected);
}
