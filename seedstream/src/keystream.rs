// SPDX-License-Identifier: CC0-1.0

//! Keystream generation over consecutive block counters.

use core::cmp;
use core::fmt;

use rand::{CryptoRng, RngCore};

use crate::chacha::{block, Rounds, BLOCK_SIZE, KEY_SIZE, NONCE_SIZE};
use crate::Error;

/// A ChaCha keystream which can be positioned at any byte.
///
/// The block counter is 64 bits wide and wraps silently. Streams long enough
/// to wrap it reuse keystream and are the caller's responsibility to avoid.
#[derive(Clone)]
pub struct Keystream {
    /// A 256 bit secret key.
    key: [u8; KEY_SIZE],
    /// A 64 bit nonce. A key/nonce pair should only be used for one stream.
    nonce: [u8; NONCE_SIZE],
    rounds: Rounds,
    /// Counter of the next block to generate.
    block_count: u64,
    /// The most recently generated block.
    buffer: [u8; BLOCK_SIZE],
    /// Index of the next unread byte of `buffer`, `BLOCK_SIZE` when drained.
    buffer_pos: usize,
}

impl Keystream {
    /// Make a new keystream positioned at byte `seek`.
    ///
    /// The first block generated is `seek / 64` and its first `seek % 64`
    /// bytes are discarded.
    pub fn new(key: [u8; KEY_SIZE], nonce: [u8; NONCE_SIZE], rounds: Rounds, seek: u64) -> Self {
        let mut keystream = Keystream::from_block(key, nonce, rounds, 0);
        keystream.seek(seek);
        keystream
    }

    /// Make a new keystream starting at the first byte of block `counter`.
    pub fn from_block(
        key: [u8; KEY_SIZE],
        nonce: [u8; NONCE_SIZE],
        rounds: Rounds,
        counter: u64,
    ) -> Self {
        Keystream {
            key,
            nonce,
            rounds,
            block_count: counter,
            buffer: [0; BLOCK_SIZE],
            buffer_pos: BLOCK_SIZE,
        }
    }

    /// Make a new keystream from unchecked inputs.
    ///
    /// # Errors
    ///
    /// * `InvalidKeyLength` - The key is not 32 bytes.
    /// * `InvalidNonceLength` - The nonce is not 8 bytes.
    /// * `UnsupportedRounds` - Rounds is not one of 8, 12 or 20.
    pub fn from_slices(key: &[u8], nonce: &[u8], rounds: u32, seek: u64) -> Result<Self, Error> {
        let key = <[u8; KEY_SIZE]>::try_from(key).map_err(|_| Error::InvalidKeyLength(key.len()))?;
        let nonce = <[u8; NONCE_SIZE]>::try_from(nonce)
            .map_err(|_| Error::InvalidNonceLength(nonce.len()))?;
        let rounds = Rounds::try_from(rounds)?;
        Ok(Keystream::new(key, nonce, rounds, seek))
    }

    /// Round variant of this stream.
    pub fn rounds(&self) -> Rounds {
        self.rounds
    }

    /// Byte offset of the next keystream byte.
    pub fn position(&self) -> u64 {
        let buffered = (BLOCK_SIZE - self.buffer_pos) as u64;
        self.block_count
            .wrapping_mul(BLOCK_SIZE as u64)
            .wrapping_sub(buffered)
    }

    /// Update the index of the keystream to the given byte.
    pub fn seek(&mut self, seek: u64) {
        self.set_block(seek / BLOCK_SIZE as u64);
        let discard = (seek % BLOCK_SIZE as u64) as usize;
        if discard > 0 {
            self.refill();
            self.consume(discard);
        }
    }

    /// Update the index of the keystream to the start of a block.
    pub fn set_block(&mut self, counter: u64) {
        self.drain();
        self.block_count = counter;
    }

    /// Replace the key and nonce, restarting at block zero.
    ///
    /// Any buffered keystream from the previous key is wiped, never handed out.
    pub fn rekey(&mut self, key: [u8; KEY_SIZE], nonce: [u8; NONCE_SIZE]) {
        self.drain();
        self.key = key;
        self.nonce = nonce;
        self.block_count = 0;
    }

    /// Write the next `out.len()` keystream bytes into `out`.
    pub fn fill(&mut self, out: &mut [u8]) {
        let mut written = 0;
        while written < out.len() {
            let remaining = out.len() - written;
            if self.buffer_pos == BLOCK_SIZE && remaining >= BLOCK_SIZE {
                // Whole blocks skip the buffer.
                out[written..written + BLOCK_SIZE].copy_from_slice(&self.next_block());
                written += BLOCK_SIZE;
                continue;
            }
            if self.buffer_pos == BLOCK_SIZE {
                self.refill();
            }
            let n = cmp::min(remaining, BLOCK_SIZE - self.buffer_pos);
            out[written..written + n]
                .copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + n]);
            self.consume(n);
            written += n;
        }
    }

    /// Blocks of this stream's key and nonce, independent of its position.
    pub fn blocks(&self, start_counter: u64, num_blocks: usize) -> Blocks {
        generate(self.key, self.nonce, self.rounds, start_counter, num_blocks)
    }

    fn next_block(&mut self) -> [u8; BLOCK_SIZE] {
        let keystream = block(&self.key, self.block_count, &self.nonce, self.rounds);
        self.block_count = self.block_count.wrapping_add(1);
        keystream
    }

    fn refill(&mut self) {
        self.buffer = self.next_block();
        self.buffer_pos = 0;
    }

    /// Mark `n` buffered bytes as read, clearing them.
    fn consume(&mut self, n: usize) {
        for byte in &mut self.buffer[self.buffer_pos..self.buffer_pos + n] {
            *byte = 0;
        }
        self.buffer_pos += n;
    }

    /// Throw away the unread rest of the buffered block.
    fn drain(&mut self) {
        self.consume(BLOCK_SIZE - self.buffer_pos);
    }
}

impl fmt::Debug for Keystream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystream")
            .field("rounds", &self.rounds)
            .field("position", &self.position())
            .finish_non_exhaustive()
    }
}

impl RngCore for Keystream {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.fill(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.fill(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.fill(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill(dest);
        Ok(())
    }
}

impl CryptoRng for Keystream {}

/// Lazily computed keystream blocks at consecutive counters.
#[derive(Clone)]
pub struct Blocks {
    key: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
    rounds: Rounds,
    next_counter: u64,
    remaining: usize,
}

impl Iterator for Blocks {
    type Item = [u8; BLOCK_SIZE];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let keystream = block(&self.key, self.next_counter, &self.nonce, self.rounds);
        self.next_counter = self.next_counter.wrapping_add(1);
        self.remaining -= 1;
        Some(keystream)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Blocks {}

/// Keystream blocks at counters `start_counter`, `start_counter + 1`, ...
///
/// To read a stream from byte `skip`, start at counter `skip / 64` and
/// discard the first `skip % 64` bytes of the first block.
pub fn generate(
    key: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
    rounds: Rounds,
    start_counter: u64,
    num_blocks: usize,
) -> Blocks {
    Blocks {
        key,
        nonce,
        rounds,
        next_counter: start_counter,
        remaining: num_blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::vec;
    use std::vec::Vec;

    const KEY: [u8; 32] = *b"helloworld!helloworld!helloworld";
    const NONCE: [u8; 8] = *b"!hellowo";

    fn gen_garbage(garbage_len: u32) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let buffer: Vec<u8> = (0..garbage_len).map(|_| rng.gen()).collect();
        buffer
    }

    fn concat(blocks: Blocks) -> Vec<u8> {
        blocks.flat_map(|b| b.to_vec()).collect()
    }

    #[test]
    fn test_fill_matches_blocks() {
        let mut keystream = Keystream::new(KEY, NONCE, Rounds::ChaCha20, 0);
        let mut out = vec![0u8; 4 * 64];
        keystream.fill(&mut out);
        assert_eq!(out, concat(generate(KEY, NONCE, Rounds::ChaCha20, 0, 4)));
        assert_eq!(keystream.position(), 256);
    }

    #[test]
    fn test_fill_is_continuous_across_calls() {
        let expected = concat(generate(KEY, NONCE, Rounds::ChaCha8, 0, 8));
        let mut keystream = Keystream::new(KEY, NONCE, Rounds::ChaCha8, 0);
        let mut out = Vec::new();
        for len in [1, 3, 60, 64, 65, 0, 129, 190] {
            let mut chunk = vec![0u8; len];
            keystream.fill(&mut chunk);
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out.len(), 512);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_seek_discards_within_block() {
        let reference = concat(generate(KEY, NONCE, Rounds::ChaCha12, 0, 4));
        let mut keystream = Keystream::new(KEY, NONCE, Rounds::ChaCha12, 70);
        assert_eq!(keystream.position(), 70);
        let mut out = [0u8; 100];
        keystream.fill(&mut out);
        assert_eq!(out[..], reference[70..170]);
    }

    #[test]
    fn test_from_block() {
        let mut keystream = Keystream::from_block(KEY, NONCE, Rounds::ChaCha20, 128);
        let mut out = [0u8; 64];
        keystream.fill(&mut out);
        assert_eq!(out, block(&KEY, 128, &NONCE, Rounds::ChaCha20));
        assert_eq!(keystream.position(), 129 * 64);
    }

    #[test]
    fn test_set_block_drops_partial_block() {
        let mut keystream = Keystream::new(KEY, NONCE, Rounds::ChaCha20, 0);
        let mut out = [0u8; 10];
        keystream.fill(&mut out);
        keystream.set_block(3);
        let mut out = [0u8; 64];
        keystream.fill(&mut out);
        assert_eq!(out, block(&KEY, 3, &NONCE, Rounds::ChaCha20));
    }

    #[test]
    fn test_rekey_never_reuses_stale_keystream() {
        let new_key = [7u8; 32];
        let new_nonce = [9u8; 8];
        let mut keystream = Keystream::new(KEY, NONCE, Rounds::ChaCha20, 0);
        let mut out = [0u8; 17];
        keystream.fill(&mut out);
        keystream.rekey(new_key, new_nonce);
        assert_eq!(keystream.position(), 0);
        let mut out = [0u8; 64];
        keystream.fill(&mut out);
        assert_eq!(out, block(&new_key, 0, &new_nonce, Rounds::ChaCha20));
    }

    #[test]
    fn test_from_slices() {
        assert!(Keystream::from_slices(&KEY, &NONCE, 20, 0).is_ok());
        assert_eq!(
            Keystream::from_slices(&KEY[..31], &NONCE, 20, 0).unwrap_err(),
            Error::InvalidKeyLength(31)
        );
        assert_eq!(
            Keystream::from_slices(&KEY, &[0u8; 12], 20, 0).unwrap_err(),
            Error::InvalidNonceLength(12)
        );
        assert_eq!(
            Keystream::from_slices(&KEY, &NONCE, 16, 0).unwrap_err(),
            Error::UnsupportedRounds(16)
        );
    }

    #[test]
    fn test_blocks_iterator() {
        let keystream = Keystream::new(KEY, NONCE, Rounds::ChaCha8, 5000);
        let blocks = keystream.blocks(10, 3);
        assert_eq!(blocks.len(), 3);
        let collected: Vec<[u8; 64]> = blocks.collect();
        for (i, b) in collected.iter().enumerate() {
            assert_eq!(*b, block(&KEY, 10 + i as u64, &NONCE, Rounds::ChaCha8));
        }
        assert_eq!(generate(KEY, NONCE, Rounds::ChaCha8, 0, 0).next(), None);
    }

    #[test]
    fn test_rng_core_words_are_little_endian() {
        let first = block(&KEY, 0, &NONCE, Rounds::ChaCha20);
        let mut keystream = Keystream::new(KEY, NONCE, Rounds::ChaCha20, 0);
        assert_eq!(
            keystream.next_u32(),
            u32::from_le_bytes(first[0..4].try_into().unwrap())
        );
        assert_eq!(
            keystream.next_u64(),
            u64::from_le_bytes(first[4..12].try_into().unwrap())
        );
    }

    #[test]
    fn test_fuzz_seek() {
        for _ in 0..20 {
            let key: [u8; 32] = gen_garbage(32).try_into().unwrap();
            let nonce: [u8; 8] = gen_garbage(8).try_into().unwrap();
            for i in 0..10u64 {
                let skip = i * 37 + rand::thread_rng().gen_range(0..64);
                let mut from_start = Keystream::new(key, nonce, Rounds::ChaCha20, 0);
                let mut prefix = vec![0u8; skip as usize];
                from_start.fill(&mut prefix);
                let mut expected = vec![0u8; 129];
                from_start.fill(&mut expected);

                let mut seeked = Keystream::new(key, nonce, Rounds::ChaCha20, 0);
                seeked.seek(skip);
                let mut buffer = vec![0u8; 129];
                seeked.fill(&mut buffer);
                assert_eq!(buffer, expected);
            }
        }
    }

    #[test]
    fn test_debug_hides_key() {
        let keystream = Keystream::new(KEY, NONCE, Rounds::ChaCha20, 3);
        let debug = std::format!("{:?}", keystream);
        assert!(!debug.contains("104"));
        assert!(debug.contains("position: 3"));
    }
}
