// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ChaCha permutation and block function in the original Bernstein layout:
//! a 64-bit block counter followed by a 64-bit nonce.

use core::fmt;

use crate::Error;

/// The first four words (32-bit) of the ChaCha state are constants, "expand 32-byte k".
const WORD_1: u32 = 0x61707865;
const WORD_2: u32 = 0x3320646e;
const WORD_3: u32 = 0x79622d32;
const WORD_4: u32 = 0x6b206574;

/// Each quarter round of ChaCha scrambles 4 words (32-bit) of the state
/// using some Addition (mod 2^32), Rotation, and XOR (ARX). 8 quarter
/// rounds make up a double round. A block is broken up into 16 32-bit words
/// and each quarter round takes 4 words as input.
const CHACHA_ROUND_INDICES: [(usize, usize, usize, usize); 8] = [
    // Columns of the 4x4 matrix of state words.
    (0, 4, 8, 12),
    (1, 5, 9, 13),
    (2, 6, 10, 14),
    (3, 7, 11, 15),
    // Diagonals of the 4x4 matrix of state words.
    (0, 5, 10, 15),
    (1, 6, 11, 12),
    (2, 7, 8, 13),
    (3, 4, 9, 14),
];

/// The cipher's block size is 64 bytes.
pub const BLOCK_SIZE: usize = 64;
/// Number of key bytes.
pub const KEY_SIZE: usize = 32;
/// Number of nonce bytes.
pub const NONCE_SIZE: usize = 8;

/// The sixteen 32-bit words a block is computed over.
pub type State = [u32; 16];

/// Number of rounds applied by the block function.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rounds {
    /// ChaCha8, the high speed variant.
    ChaCha8,
    /// ChaCha12, the middle ground.
    ChaCha12,
    /// ChaCha20, the conservative variant.
    #[default]
    ChaCha20,
}

impl Rounds {
    /// Number of rounds, one of 8, 12 or 20.
    pub fn count(self) -> u32 {
        match self {
            Rounds::ChaCha8 => 8,
            Rounds::ChaCha12 => 12,
            Rounds::ChaCha20 => 20,
        }
    }

    /// Number of double rounds needed to reach the round count.
    pub fn double_rounds(self) -> u32 {
        self.count() / 2
    }
}

impl TryFrom<u32> for Rounds {
    type Error = Error;

    fn try_from(rounds: u32) -> Result<Self, Self::Error> {
        match rounds {
            8 => Ok(Rounds::ChaCha8),
            12 => Ok(Rounds::ChaCha12),
            20 => Ok(Rounds::ChaCha20),
            other => Err(Error::UnsupportedRounds(other)),
        }
    }
}

impl fmt::Display for Rounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CHACHA{}", self.count())
    }
}

/// Apply one quarter round to the words at `a`, `b`, `c` and `d`.
pub fn quarter_round(state: &mut State, a: usize, b: usize, c: usize, d: usize) {
    state[a] = state[a].wrapping_add(state[b]);
    state[d] = (state[d] ^ state[a]).rotate_left(16);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_left(12);
    state[a] = state[a].wrapping_add(state[b]);
    state[d] = (state[d] ^ state[a]).rotate_left(8);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_left(7);
}

/// A column pass followed by a diagonal pass, advancing the state two rounds.
pub fn double_round(state: &mut State) {
    for (a, b, c, d) in CHACHA_ROUND_INDICES {
        quarter_round(state, a, b, c, d);
    }
}

/// Permute the state and add the input words back in.
fn chacha_block(state: &mut State, rounds: Rounds) {
    let initial_state = *state;
    for _ in 0..rounds.double_rounds() {
        double_round(state)
    }
    for (modified, initial) in state.iter_mut().zip(initial_state.iter()) {
        *modified = modified.wrapping_add(*initial)
    }
}

fn le_word(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Lay out constants, key, counter and nonce as the initial state.
pub(crate) fn prepare_state(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    counter: u64,
) -> State {
    let mut state: State = [0; 16];
    state[0] = WORD_1;
    state[1] = WORD_2;
    state[2] = WORD_3;
    state[3] = WORD_4;
    for (word, chunk) in state[4..12].iter_mut().zip(key.chunks_exact(4)) {
        *word = le_word(chunk);
    }
    state[12] = counter as u32;
    state[13] = (counter >> 32) as u32;
    state[14] = le_word(&nonce[0..4]);
    state[15] = le_word(&nonce[4..8]);
    state
}

fn keystream_from_state(state: &State) -> [u8; BLOCK_SIZE] {
    let mut keystream = [0u8; BLOCK_SIZE];
    for (chunk, word) in keystream.chunks_exact_mut(4).zip(state.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    keystream
}

/// Compute the 64-byte keystream block at `counter`.
///
/// Identical inputs always produce identical output.
///
/// # Arguments
///
/// * `key` - The 256 bit key.
/// * `counter` - Index of the block in the stream.
/// * `nonce` - The 64 bit nonce. A key/nonce pair should only be used for one stream.
/// * `rounds` - Round variant.
pub fn block(
    key: &[u8; KEY_SIZE],
    counter: u64,
    nonce: &[u8; NONCE_SIZE],
    rounds: Rounds,
) -> [u8; BLOCK_SIZE] {
    let mut state = prepare_state(key, nonce, counter);
    chacha_block(&mut state, rounds);
    keystream_from_state(&state)
}
