// SPDX-License-Identifier: CC0-1.0

//! Fuzz test for keystream positioning.
//!
//! Seeking straight to an offset must produce the same bytes as reading
//! up to it from an earlier position.

#![no_main]
use libfuzzer_sys::fuzz_target;
use seedstream::{Keystream, Rounds};

fuzz_target!(|data: &[u8]| {
    if data.len() < 44 {
        return;
    }

    let key: [u8; 32] = data[..32].try_into().unwrap();
    let nonce: [u8; 8] = data[32..40].try_into().unwrap();
    let rounds = match data[40] % 3 {
        0 => Rounds::ChaCha8,
        1 => Rounds::ChaCha12,
        _ => Rounds::ChaCha20,
    };
    // Spread starting points across the counter space, some unaligned.
    let start = (u64::from(data[41]) << 48) | u64::from(data[41]);
    let skip = u64::from(u16::from_le_bytes([data[42], data[43]]) % 1024);

    let mut reference = Keystream::new(key, nonce, rounds, start);
    let mut prefix = vec![0u8; skip as usize];
    reference.fill(&mut prefix);
    let mut expected = [0u8; 100];
    reference.fill(&mut expected);

    let mut seeked = Keystream::new(key, nonce, rounds, start + skip);
    let mut actual = [0u8; 100];
    seeked.fill(&mut actual);

    assert_eq!(expected, actual);
});
