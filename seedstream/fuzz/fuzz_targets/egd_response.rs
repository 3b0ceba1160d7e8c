// SPDX-License-Identifier: CC0-1.0

//! Fuzz test for parsing daemon responses.
//!
//! Arbitrary bytes are fed to the response reader in arbitrary chunk sizes.
//! The reader must never panic, and a completed response must be exactly
//! what the daemon announced.

#![no_main]
use libfuzzer_sys::fuzz_target;
use seedstream::egd::ResponseReader;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks the request length, second the read chunk size.
    let requested = data[0] as usize;
    let chunk = (data[1] as usize).max(1);
    let mut response = &data[2..];

    let mut out = vec![0xffu8; requested];
    let mut reader = ResponseReader::new(&mut out).unwrap();
    while let Some(buffer) = reader.buffer() {
        let n = buffer.len().min(chunk).min(response.len());
        buffer[..n].copy_from_slice(&response[..n]);
        response = &response[n..];
        if reader.advance(n).is_err() {
            assert!(!reader.is_complete());
            return;
        }
    }

    assert_eq!(data[2] as usize, requested);
    assert_eq!(out[..], data[3..3 + requested]);
});
