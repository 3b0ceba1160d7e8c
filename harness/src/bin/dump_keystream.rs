// SPDX-License-Identifier: CC0-1.0

//! Print the known answer vectors, or stream raw keystream to stdout for
//! statistical test suites.

use std::io::{self, BufWriter, ErrorKind, Write};

use hex::prelude::*;
use log::info;
use rand::rngs::OsRng;
use rand::RngCore;
use seedstream::Keystream;

configure_me::include_config!("dump_keystream");

const CHUNK_BYTES: usize = 8192;

/// Decode a hex parameter, or draw it from the OS when absent.
fn bytes_or_random(param: &Option<String>, len: usize) -> Vec<u8> {
    match param {
        Some(encoded) => Vec::from_hex(encoded).expect("hex encoded parameter"),
        None => {
            let mut bytes = vec![0u8; len];
            OsRng.fill_bytes(&mut bytes);
            bytes
        }
    }
}

fn write_raw<W: Write>(
    out: &mut W,
    keystream: &mut Keystream,
    length: Option<u64>,
) -> io::Result<()> {
    let mut chunk = [0u8; CHUNK_BYTES];
    let mut remaining = length;
    loop {
        let n = match remaining {
            Some(0) => return out.flush(),
            Some(left) => left.min(CHUNK_BYTES as u64) as usize,
            None => CHUNK_BYTES,
        };
        keystream.fill(&mut chunk[..n]);
        out.write_all(&chunk[..n])?;
        remaining = remaining.map(|left| left - n as u64);
    }
}

fn main() {
    env_logger::init();

    let (config, _) = Config::including_optional_config_files::<&[&str]>(&[]).unwrap_or_exit();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let result = if config.raw {
        let key = bytes_or_random(&config.key, seedstream::KEY_SIZE);
        let nonce = bytes_or_random(&config.nonce, seedstream::NONCE_SIZE);
        let mut keystream = Keystream::from_slices(&key, &nonce, config.rounds, config.offset)
            .expect("valid keystream parameters");
        info!(
            "Writing {} keystream from offset {}.",
            keystream.rounds(),
            config.offset
        );
        write_raw(&mut out, &mut keystream, config.length)
    } else {
        seedstream_harness::write_vectors(&mut out).and_then(|_| out.flush())
    };

    match result {
        Ok(()) => {}
        // The reader went away, usually a pipe into head.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
        Err(e) => {
            eprintln!("Failed to write keystream: {e}");
            std::process::exit(1);
        }
    }
}
