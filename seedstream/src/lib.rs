// SPDX-License-Identifier: CC0-1.0

//! ChaCha keystream generation and the entropy gathering daemon (EGD)
//! transport used to seed it.
//!
//! The keystream half is a pure computation: a 256 bit key, a 64 bit nonce and
//! a 64 bit block counter are run through 8, 12 or 20 rounds of the ChaCha
//! permutation to produce 64 byte blocks. It is available without `std`.
//!
//! The EGD half asks a local daemon for strong entropy over a socket. Any
//! deviation from the protocol is a hard failure, never a short success.
//!
//! # Keystream
//!
//! ```
//! use seedstream::{Keystream, Rounds};
//!
//! let key = [0u8; 32];
//! let nonce = [0u8; 8];
//!
//! // Start reading 8192 bytes into the stream.
//! let mut keystream = Keystream::new(key, nonce, Rounds::ChaCha20, 8192);
//! let mut out = [0u8; 32];
//! keystream.fill(&mut out);
//!
//! // The same bytes are the first half of block 128.
//! let block = seedstream::chacha::block(&key, 128, &nonce, Rounds::ChaCha20);
//! assert_eq!(out[..], block[..32]);
//! ```
//!
//! # Entropy Gathering Daemon (requires `std` feature)
//!
//! ```no_run
//! # #[cfg(feature = "std")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use seedstream::io::EgdClient;
//!
//! let client = EgdClient::new("/var/run/egd-pool".parse()?);
//! let seed = client.fetch(32)?;
//! assert_eq!(seed.len(), 32);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "std"))]
//! # fn main() {}
//! ```
//!
//! # Protocol Details
//!
//! | Direction | Field | Size | Description |
//! |-----------|-------|------|-------------|
//! | Request | Command | 1 byte | Always `0x01` |
//! | Request | Length | 1 byte | Requested bytes, 0 to 255 |
//! | Response | Length | 1 byte | Bytes the daemon is returning |
//! | Response | Entropy | Length bytes | The entropy |
#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod chacha;
#[cfg(feature = "std")]
pub mod egd;
#[cfg(feature = "std")]
pub mod entropy;
#[cfg(feature = "tokio")]
pub mod futures;
#[cfg(feature = "std")]
pub mod io;
pub mod keystream;

use core::fmt;

pub use chacha::{Rounds, BLOCK_SIZE, KEY_SIZE, NONCE_SIZE};
pub use keystream::{generate, Blocks, Keystream};

/// Keystream configuration rejected at construction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Only 8, 12 and 20 rounds are supported.
    UnsupportedRounds(u32),
    /// Keys are exactly 32 bytes.
    InvalidKeyLength(usize),
    /// Nonces are exactly 8 bytes.
    InvalidNonceLength(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedRounds(rounds) => {
                write!(f, "Unsupported round count {rounds}, expected 8, 12 or 20.")
            }
            Error::InvalidKeyLength(len) => {
                write!(f, "Key must be {KEY_SIZE} bytes, got {len}.")
            }
            Error::InvalidNonceLength(len) => {
                write!(f, "Nonce must be {NONCE_SIZE} bytes, got {len}.")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::UnsupportedRounds(_) => None,
            Error::InvalidKeyLength(_) => None,
            Error::InvalidNonceLength(_) => None,
        }
    }
}
