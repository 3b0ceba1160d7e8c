// SPDX-License-Identifier: CC0-1.0

//! Helpers for driving seedstream across a process boundary.
//!
//! The EGD tests run a daemon stand-in and a client as separate processes. The
//! client reports its result as `KEY:VALUE` lines which the test parses, see
//! [`Status`]. The daemon stand-in serves prefixes of a fixed text and can be
//! told to misbehave in each of the ways a real daemon might, see [`Bugs`].
//! Keystream dumps use the same text format as the known answer vectors.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
#[cfg(unix)]
use std::path::Path;

use hex::prelude::*;
use log::{debug, info};
use seedstream::egd::{COMMAND_READ_ENTROPY, NUM_REQUEST_BYTES};
use seedstream::entropy::{
    SourceFlags, StrongRngError, ERR_ACCESS_STRONG_RNG, ERR_INIT_STRONG_RNG,
};
use seedstream::{generate, Rounds, BLOCK_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

/// Served by the daemon stand-in. Not random!
pub const O_FORTUNA: &[u8] = b"Sors immanis et inanis rota tu volubilis status malus vana salus \
semper dissolubilis obumbrata et velata michi quoque niteris nunc \
per ludum dorsum nudum fero tui sceleris Sors salutis et virtutis \
michi nunc contraria est affectus et defectus semper in angaria";

/// Blocks per vector in a keystream dump.
pub const DUMP_BLOCKS: usize = 8;
/// Keystream bytes per hex line in a keystream dump.
const DUMP_LINE_BYTES: usize = 32;
const DUMP_SEPARATOR: &str = "================================================================";

/// An error occured in one of the harness adapters.
#[derive(Debug)]
pub enum Error {
    /// A status line is not of the form `KEY:VALUE`.
    MalformedLine(String),
    /// A status report has neither a complete success nor an error.
    IncompleteStatus,
    /// A status value could not be decoded.
    InvalidValue { key: String, value: String },
    /// The client sent something other than a read entropy command.
    UnexpectedCommand(u8),
    Network(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedLine(line) => write!(f, "malformed status line {line:?}"),
            Error::IncompleteStatus => write!(f, "status report is incomplete"),
            Error::InvalidValue { key, value } => {
                write!(f, "invalid value {value:?} for status key {key}")
            }
            Error::UnexpectedCommand(command) => {
                write!(f, "unexpected command byte {command:#04x}")
            }
            Error::Network(e) => write!(f, "network {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MalformedLine(_) => None,
            Error::IncompleteStatus => None,
            Error::InvalidValue { .. } => None,
            Error::UnexpectedCommand(_) => None,
            Error::Network(e) => Some(e),
        }
    }
}

// Convert IO errors.
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Network(e)
    }
}

/// Result of a strong entropy request as reported by a client process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Printed as `FLAGS:<hex>` and `BYTES:<hex>` lines.
    Success { flags: SourceFlags, bytes: Vec<u8> },
    /// Printed as an `ERR:<code>` line.
    Failure(StrongRngError),
}

impl Status {
    /// Status of a gather which filled `bytes`.
    pub fn from_gather(result: Result<SourceFlags, StrongRngError>, bytes: &[u8]) -> Self {
        match result {
            Ok(flags) => Status::Success {
                flags,
                bytes: bytes.to_vec(),
            },
            Err(e) => Status::Failure(e),
        }
    }

    /// Decode the lines printed by a client process.
    pub fn parse(output: &str) -> Result<Self, Error> {
        let fields = parse_fields(output)?;
        if let Some(code) = fields.get("ERR") {
            let error = match code.parse::<u16>() {
                Ok(ERR_INIT_STRONG_RNG) => StrongRngError::Init,
                Ok(ERR_ACCESS_STRONG_RNG) => StrongRngError::Access,
                _ => return Err(invalid("ERR", code)),
            };
            return Ok(Status::Failure(error));
        }

        let (flags, bytes) = match (fields.get("FLAGS"), fields.get("BYTES")) {
            (Some(flags), Some(bytes)) => (flags, bytes),
            _ => return Err(Error::IncompleteStatus),
        };
        let flags = u32::from_str_radix(flags, 16).map_err(|_| invalid("FLAGS", flags))?;
        let bytes = Vec::from_hex(bytes).map_err(|_| invalid("BYTES", bytes))?;
        Ok(Status::Success {
            flags: SourceFlags::from_bits(flags),
            bytes,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success { flags, bytes } => {
                writeln!(f, "FLAGS:{flags:x}")?;
                write!(f, "BYTES:{}", bytes[..].to_lower_hex_string())
            }
            Status::Failure(e) => write!(f, "ERR:{}", e.code()),
        }
    }
}

fn invalid(key: &str, value: &str) -> Error {
    Error::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Split `KEY:VALUE` lines into a map. Blank lines are skipped.
pub fn parse_fields(output: &str) -> Result<BTreeMap<String, String>, Error> {
    let mut fields = BTreeMap::new();
    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedLine(line.to_string()))?;
        fields.insert(key.to_string(), value.to_string());
    }
    Ok(fields)
}

/// Misbehaviors of the daemon stand-in, all off by default.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Bugs {
    /// Send only half of the response.
    pub truncate_output: bool,
    /// Answer with half the requested length.
    pub short_output: bool,
    /// Answer with a length of zero.
    pub no_output: bool,
    /// Hang up after reading the request.
    pub close_after_read: bool,
    /// Hang up without reading the request.
    pub close_before_read: bool,
}

/// Bytes the daemon stand-in sends in answer to a request for `requested` bytes.
pub fn reply(requested: u8, bugs: Bugs) -> Vec<u8> {
    let mut len = requested;
    if bugs.short_output {
        len /= 2;
    }
    if bugs.no_output {
        len = 0;
    }

    let mut response = Vec::with_capacity(len as usize + 1);
    response.push(len);
    response.extend_from_slice(&O_FORTUNA[..len as usize]);
    if bugs.truncate_output {
        response.truncate(response.len() / 2);
    }
    response
}

/// Answer one request on an accepted connection.
///
/// The connection is left for the caller to close.
pub async fn serve_session<S>(stream: &mut S, bugs: Bugs) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if bugs.close_before_read {
        debug!("Hanging up before reading the request.");
        return Ok(());
    }

    let mut request = [0u8; NUM_REQUEST_BYTES];
    stream.read_exact(&mut request).await?;
    if bugs.close_after_read {
        debug!("Hanging up after reading the request.");
        return Ok(());
    }
    if request[0] != COMMAND_READ_ENTROPY {
        return Err(Error::UnexpectedCommand(request[0]));
    }

    let response = reply(request[1], bugs);
    debug!(
        "Asked for {} bytes, sending {} response bytes.",
        request[1],
        response.len()
    );
    stream.write_all(&response).await?;
    stream.flush().await?;
    Ok(())
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// A deliberately broken EGD which serves a single connection.
pub struct FakeEgd {
    listener: Listener,
    bugs: Bugs,
}

impl FakeEgd {
    /// Listen on a TCP port, 0 picks a free one.
    pub async fn bind_tcp(host: &str, port: u16, bugs: Bugs) -> Result<Self, Error> {
        let listener = TcpListener::bind((host, port)).await?;
        Ok(FakeEgd {
            listener: Listener::Tcp(listener),
            bugs,
        })
    }

    /// Listen on a Unix domain socket. Must be called from within a runtime.
    #[cfg(unix)]
    pub fn bind_unix(path: &Path, bugs: Bugs) -> Result<Self, Error> {
        let listener = UnixListener::bind(path)?;
        Ok(FakeEgd {
            listener: Listener::Unix(listener),
            bugs,
        })
    }

    /// The bound TCP port, `None` for a Unix domain socket.
    pub fn local_port(&self) -> Option<u16> {
        match &self.listener {
            Listener::Tcp(listener) => listener.local_addr().ok().map(|addr| addr.port()),
            #[cfg(unix)]
            Listener::Unix(_) => None,
        }
    }

    /// Accept one connection, answer it and hang up.
    pub async fn serve_one(self) -> Result<(), Error> {
        match self.listener {
            Listener::Tcp(listener) => {
                let (mut stream, peer) = listener.accept().await?;
                info!("Accepted connection from {peer}.");
                serve_session(&mut stream, self.bugs).await?;
                // The client may already be gone.
                let _ = stream.shutdown().await;
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (mut stream, _) = listener.accept().await?;
                info!("Accepted connection.");
                serve_session(&mut stream, self.bugs).await?;
                let _ = stream.shutdown().await;
            }
        }
        Ok(())
    }
}

/// A key, nonce and byte offset to dump keystream for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Vector {
    pub key: [u8; 32],
    pub nonce: [u8; 8],
    pub offset: u64,
}

/// The tuples of the known answer vector file, each dumped for 8, 12 and 20 rounds.
pub const VECTORS: [Vector; 8] = [
    Vector {
        key: *b"helloworld!helloworld!helloworld",
        nonce: *b"!hellowo",
        offset: 0,
    },
    Vector {
        key: [0; 32],
        nonce: [0; 8],
        offset: 0,
    },
    Vector {
        key: *b"helloworld!helloworld!helloworld",
        nonce: *b"!hellowo",
        offset: 8192,
    },
    Vector {
        key: [0; 32],
        nonce: [0; 8],
        offset: 8192,
    },
    Vector {
        key: *b"Zombie ipsum reversus ab viral i",
        nonce: *b"nferno, ",
        offset: 128,
    },
    Vector {
        key: *b"nam rick grimes malum cerebro. D",
        nonce: *b"e carne ",
        offset: 512,
    },
    Vector {
        key: *b"lumbering animata corpora quaeri",
        nonce: *b"tis. Sum",
        offset: 640,
    },
    Vector {
        key: *b"mus brains sit, morbo vel malefi",
        nonce: *b"cia? De ",
        offset: 704,
    },
];

/// Write [`DUMP_BLOCKS`] blocks of keystream in the vector file format.
///
/// Output starts at the block containing `vector.offset`, leading bytes of
/// that block are not discarded.
pub fn write_vector<W: Write>(out: &mut W, vector: &Vector, rounds: Rounds) -> std::io::Result<()> {
    writeln!(out, "{DUMP_SEPARATOR}")?;
    writeln!(out, "cipher: {rounds}")?;
    writeln!(out, "   key: {}", vector.key[..].to_lower_hex_string())?;
    writeln!(out, " nonce: {}", vector.nonce[..].to_lower_hex_string())?;
    writeln!(out, "offset: {}", vector.offset)?;

    let counter = vector.offset / BLOCK_SIZE as u64;
    for block in generate(vector.key, vector.nonce, rounds, counter, DUMP_BLOCKS) {
        for line in block.chunks(DUMP_LINE_BYTES) {
            writeln!(out, "{}", line.to_lower_hex_string())?;
        }
    }
    Ok(())
}

/// Write every built-in vector for every round variant.
pub fn write_vectors<W: Write>(out: &mut W) -> std::io::Result<()> {
    for vector in &VECTORS {
        for rounds in [Rounds::ChaCha8, Rounds::ChaCha12, Rounds::ChaCha20] {
            write_vector(out, vector, rounds)?;
        }
    }
    Ok(())
}
