// SPDX-License-Identifier: CC0-1.0

//! The entropy gathering daemon wire protocol.
//!
//! This module follows a sans-io design, it builds requests and tracks the
//! progress of a response without performing any I/O. The [`crate::io`] and
//! [`crate::futures`] modules drive it over real transports.

use core::fmt;
use core::str::FromStr;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;
use std::string::String;

/// Command byte asking the daemon to return entropy right away.
pub const COMMAND_READ_ENTROPY: u8 = 0x01;
/// The length byte caps a single request.
pub const MAX_REQUEST_BYTES: usize = 255;
/// Number of bytes in a request message.
pub const NUM_REQUEST_BYTES: usize = 2;

/// Where the daemon listens.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A Unix domain stream socket.
    #[cfg(unix)]
    Unix(PathBuf),
    /// A TCP socket, normally on the loopback interface.
    Tcp(SocketAddr),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "{addr}"),
        }
    }
}

/// The endpoint string is neither a socket address nor a usable path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidEndpoint(String);

impl fmt::Display for InvalidEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid EGD endpoint: {:?}.", self.0)
    }
}

impl std::error::Error for InvalidEndpoint {}

impl FromStr for Endpoint {
    type Err = InvalidEndpoint;

    /// A socket address (`127.0.0.1:8080`) is TCP, anything else is a socket path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Endpoint::Tcp(addr));
        }
        if s.is_empty() {
            return Err(InvalidEndpoint(s.into()));
        }
        #[cfg(unix)]
        return Ok(Endpoint::Unix(PathBuf::from(s)));
        #[cfg(not(unix))]
        return Err(InvalidEndpoint(s.into()));
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::Tcp(addr)
    }
}

/// Every way an entropy request can fail.
///
/// Callers seeding a generator should not branch on these, convert to
/// [`crate::entropy::StrongRngError`] which keeps only the severity.
#[derive(Debug)]
pub enum EgdError {
    /// More bytes requested than fit in the length byte, rejected before any I/O.
    OutOfRange { requested: usize },
    /// The daemon could not be reached.
    EndpointUnreachable(std::io::Error),
    /// The request could not be sent.
    WriteError(std::io::Error),
    /// The daemon closed the connection without sending a byte.
    NoData,
    /// The daemon closed the connection part way through the entropy.
    Truncated { expected: usize, received: usize },
    /// The daemon's length byte does not match the request.
    ShortOutput { requested: usize, reported: usize },
}

impl fmt::Display for EgdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EgdError::OutOfRange { requested } => write!(
                f,
                "Requested {requested} bytes, at most {MAX_REQUEST_BYTES} fit in one request."
            ),
            EgdError::EndpointUnreachable(e) => write!(f, "Cannot reach EGD endpoint: {e}."),
            EgdError::WriteError(e) => write!(f, "Cannot send EGD request: {e}."),
            EgdError::NoData => write!(f, "EGD closed the connection without responding."),
            EgdError::Truncated { expected, received } => write!(
                f,
                "EGD response truncated after {received} of {expected} bytes."
            ),
            EgdError::ShortOutput {
                requested,
                reported,
            } => write!(
                f,
                "EGD offered {reported} bytes when {requested} were requested."
            ),
        }
    }
}

impl std::error::Error for EgdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EgdError::OutOfRange { .. } => None,
            EgdError::EndpointUnreachable(e) => Some(e),
            EgdError::WriteError(e) => Some(e),
            EgdError::NoData => None,
            EgdError::Truncated { .. } => None,
            EgdError::ShortOutput { .. } => None,
        }
    }
}

/// A validated request for entropy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Request {
    len: u8,
}

impl Request {
    /// Build a request for `len` bytes.
    ///
    /// # Errors
    ///
    /// * `OutOfRange` - More than 255 bytes.
    pub fn new(len: usize) -> Result<Self, EgdError> {
        u8::try_from(len)
            .map(|len| Request { len })
            .map_err(|_| EgdError::OutOfRange { requested: len })
    }

    /// Number of entropy bytes requested.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for a request of zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Serialize the request message.
    pub fn to_bytes(&self) -> [u8; NUM_REQUEST_BYTES] {
        [COMMAND_READ_ENTROPY, self.len]
    }
}

/// State machine of a response read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReadState {
    ReadingLength,
    ReadingPayload { bytes_read: usize },
    Complete,
}

/// Tracks a response as it arrives, writing the entropy straight into the
/// caller's buffer.
///
/// Loop on [`ResponseReader::buffer`], read into the returned slice and report
/// the count with [`ResponseReader::advance`]. A count of zero means the peer
/// closed the connection.
#[derive(Debug)]
pub struct ResponseReader<'a> {
    out: &'a mut [u8],
    length_byte: [u8; 1],
    state: ReadState,
}

impl<'a> ResponseReader<'a> {
    /// Expect a response with exactly `out.len()` bytes of entropy.
    ///
    /// # Errors
    ///
    /// * `OutOfRange` - The buffer is longer than a single request can fill.
    pub fn new(out: &'a mut [u8]) -> Result<Self, EgdError> {
        Request::new(out.len())?;
        Ok(ResponseReader {
            out,
            length_byte: [0u8],
            state: ReadState::ReadingLength,
        })
    }

    /// The slice the next read should fill, `None` once the response is complete.
    pub fn buffer(&mut self) -> Option<&mut [u8]> {
        match self.state {
            ReadState::ReadingLength => Some(&mut self.length_byte[..]),
            ReadState::ReadingPayload { bytes_read } => Some(&mut self.out[bytes_read..]),
            ReadState::Complete => None,
        }
    }

    /// Account for `n` bytes read into the last [`ResponseReader::buffer`].
    ///
    /// # Errors
    ///
    /// * `NoData` - Closed before the length byte.
    /// * `ShortOutput` - The length byte disagrees with the request.
    /// * `Truncated` - Closed before all the entropy arrived.
    pub fn advance(&mut self, n: usize) -> Result<(), EgdError> {
        let expected = self.out.len();
        match self.state {
            ReadState::ReadingLength => {
                if n == 0 {
                    return Err(EgdError::NoData);
                }
                let reported = self.length_byte[0] as usize;
                if reported != expected {
                    return Err(EgdError::ShortOutput {
                        requested: expected,
                        reported,
                    });
                }
                self.state = if expected == 0 {
                    ReadState::Complete
                } else {
                    ReadState::ReadingPayload { bytes_read: 0 }
                };
            }
            ReadState::ReadingPayload { bytes_read } => {
                if n == 0 {
                    return Err(EgdError::Truncated {
                        expected,
                        received: bytes_read,
                    });
                }
                let bytes_read = bytes_read + n;
                self.state = if bytes_read >= expected {
                    ReadState::Complete
                } else {
                    ReadState::ReadingPayload { bytes_read }
                };
            }
            ReadState::Complete => {}
        }
        Ok(())
    }

    /// Classify a read error as the peer going away at this point of the response.
    pub fn interrupted(&self) -> EgdError {
        match self.state {
            ReadState::ReadingLength => EgdError::NoData,
            ReadState::ReadingPayload { bytes_read } => EgdError::Truncated {
                expected: self.out.len(),
                received: bytes_read,
            },
            ReadState::Complete => EgdError::Truncated {
                expected: self.out.len(),
                received: self.out.len(),
            },
        }
    }

    /// True once every requested byte has been read.
    pub fn is_complete(&self) -> bool {
        self.state == ReadState::Complete
    }
}

/// Zero a buffer so no partial entropy outlives a failed request.
pub(crate) fn wipe(out: &mut [u8]) {
    for byte in out.iter_mut() {
        *byte = 0;
    }
}
