// SPDX-License-Identifier: CC0-1.0

//! Blocking interfaces for requesting entropy from an EGD over Read/Write
//! transports.
//!
//! Every session is a single request and response. The connection is closed
//! on every exit path and never reused or retried.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;
use std::vec;
use std::vec::Vec;

use log::{debug, warn};

use crate::egd::{wipe, EgdError, Endpoint, Request, ResponseReader};
use crate::entropy::{EntropySource, SourceFlags, StrongRngError};

/// Client for a single entropy gathering daemon.
#[derive(Clone, Debug)]
pub struct EgdClient {
    endpoint: Endpoint,
    timeout: Option<Duration>,
}

impl EgdClient {
    /// New client for the daemon at `endpoint`.
    ///
    /// No timeout is applied by default, reads block until the daemon
    /// answers or closes the connection.
    pub fn new(endpoint: Endpoint) -> Self {
        EgdClient {
            endpoint,
            timeout: None,
        }
    }

    /// Bound connect (TCP only), read and write on the transport.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The daemon's endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Request `len` bytes of entropy.
    ///
    /// # Errors
    ///
    /// * `OutOfRange` - More than 255 bytes, nothing is sent.
    /// * `EndpointUnreachable` - Could not connect.
    /// * `WriteError`, `NoData`, `Truncated`, `ShortOutput` - The exchange failed.
    pub fn fetch(&self, len: usize) -> Result<Vec<u8>, EgdError> {
        Request::new(len)?;
        let mut out = vec![0u8; len];
        self.fill(&mut out)?;
        Ok(out)
    }

    /// Fill `out` with entropy, requesting exactly `out.len()` bytes.
    ///
    /// On failure `out` is zeroed.
    pub fn fill(&self, out: &mut [u8]) -> Result<(), EgdError> {
        if let Err(e) = Request::new(out.len()) {
            wipe(out);
            return Err(e);
        }

        debug!("Connecting to EGD at {}.", self.endpoint);
        let mut transport = match Transport::connect(&self.endpoint, self.timeout) {
            Ok(transport) => transport,
            Err(e) => {
                wipe(out);
                return Err(EgdError::EndpointUnreachable(e));
            }
        };

        let result = request_entropy(&mut transport, out);
        transport.close();
        debug!("Closed EGD session with {}.", self.endpoint);
        result
    }
}

impl EntropySource for EgdClient {
    fn flags(&self) -> SourceFlags {
        SourceFlags::SRC_EGD | SourceFlags::STRONG
    }

    fn fill(&mut self, out: &mut [u8]) -> Result<(), StrongRngError> {
        EgdClient::fill(self, out).map_err(|e| {
            warn!("EGD at {} unavailable: {e}", self.endpoint);
            StrongRngError::from(e)
        })
    }
}

/// Run one request/response exchange over an already connected stream.
///
/// The stream is left open, closing it is up to the caller. Bytes the daemon
/// sends after the entropy are not read. On failure `out` is zeroed.
pub fn request_entropy<S>(stream: &mut S, out: &mut [u8]) -> Result<(), EgdError>
where
    S: Read + Write,
{
    let result = exchange(stream, out);
    if result.is_err() {
        wipe(out);
    }
    result
}

fn exchange<S>(stream: &mut S, out: &mut [u8]) -> Result<(), EgdError>
where
    S: Read + Write,
{
    let request = Request::new(out.len())?;
    stream
        .write_all(&request.to_bytes())
        .map_err(EgdError::WriteError)?;
    stream.flush().map_err(EgdError::WriteError)?;
    debug!("Requested {} bytes of entropy.", request.len());

    let mut reader = ResponseReader::new(out)?;
    while let Some(buffer) = reader.buffer() {
        match stream.read(buffer) {
            Ok(n) => reader.advance(n)?,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("EGD read failed: {e}.");
                return Err(reader.interrupted());
            }
        }
    }
    debug!("Received {} bytes of entropy.", request.len());
    Ok(())
}

/// A connected stream socket of either family.
enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    fn connect(endpoint: &Endpoint, timeout: Option<Duration>) -> std::io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = match timeout {
                    Some(timeout) => TcpStream::connect_timeout(addr, timeout)?,
                    None => TcpStream::connect(addr)?,
                };
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
                Ok(Transport::Tcp(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)?;
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
                Ok(Transport::Unix(stream))
            }
        }
    }

    /// Shut down both directions, the socket itself is closed on drop.
    fn close(self) {
        // The peer may already be gone.
        let _ = match &self {
            Transport::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.flush(),
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::thread;

    const FIXTURE: &[u8] = b"Sors immanis et inanis rota tu volubilis";

    /// Daemon side of a socket pair which reads the request and writes `reply`.
    fn scripted_daemon(reply: Vec<u8>) -> (UnixStream, thread::JoinHandle<[u8; 2]>) {
        let (client, mut daemon) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || {
            let mut request = [0u8; 2];
            daemon.read_exact(&mut request).unwrap();
            daemon.write_all(&reply).unwrap();
            request
        });
        (client, handle)
    }

    fn reply_for(len: usize) -> Vec<u8> {
        let mut reply = vec![len as u8];
        reply.extend_from_slice(&FIXTURE[..len]);
        reply
    }

    #[test]
    fn test_request_entropy() {
        let (mut client, daemon) = scripted_daemon(reply_for(16));
        let mut out = [0u8; 16];
        request_entropy(&mut client, &mut out).unwrap();
        assert_eq!(&out[..], &FIXTURE[..16]);
        assert_eq!(daemon.join().unwrap(), [0x01, 16]);
    }

    #[test]
    fn test_zero_bytes() {
        let (mut client, daemon) = scripted_daemon(reply_for(0));
        let mut out = [0u8; 0];
        request_entropy(&mut client, &mut out).unwrap();
        assert_eq!(daemon.join().unwrap(), [0x01, 0]);
    }

    #[test]
    fn test_connection_left_open_after_response() {
        // The daemon does not close, the client must not wait for it.
        let (mut client, mut daemon) = UnixStream::pair().unwrap();
        daemon.write_all(&reply_for(4)).unwrap();
        let mut out = [0u8; 4];
        request_entropy(&mut client, &mut out).unwrap();
        assert_eq!(&out[..], b"Sors");
        let mut request = [0u8; 2];
        daemon.read_exact(&mut request).unwrap();
        assert_eq!(request, [0x01, 4]);
    }

    #[test]
    fn test_truncated_output_is_wiped() {
        let mut reply = reply_for(16);
        reply.truncate(8);
        let (mut client, daemon) = scripted_daemon(reply);
        let mut out = [0xaau8; 16];
        assert!(matches!(
            request_entropy(&mut client, &mut out),
            Err(EgdError::Truncated {
                expected: 16,
                received: 7
            })
        ));
        assert_eq!(out, [0u8; 16]);
        daemon.join().unwrap();
    }

    #[test]
    fn test_short_output() {
        let (mut client, daemon) = scripted_daemon(reply_for(8));
        let mut out = [0u8; 16];
        assert!(matches!(
            request_entropy(&mut client, &mut out),
            Err(EgdError::ShortOutput {
                requested: 16,
                reported: 8
            })
        ));
        daemon.join().unwrap();
    }

    #[test]
    fn test_no_output() {
        let (mut client, daemon) = scripted_daemon(Vec::new());
        let mut out = [0u8; 16];
        assert!(matches!(
            request_entropy(&mut client, &mut out),
            Err(EgdError::NoData)
        ));
        daemon.join().unwrap();
    }

    #[test]
    fn test_out_of_range_sends_nothing() {
        let mut stream = Cursor::new(Vec::new());
        let mut out = vec![0u8; 256];
        assert!(matches!(
            request_entropy(&mut stream, &mut out),
            Err(EgdError::OutOfRange { requested: 256 })
        ));
        assert!(stream.get_ref().is_empty());
    }

    #[test]
    fn test_write_failure() {
        struct Closed;
        impl Read for Closed {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Ok(0)
            }
        }
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut out = [0u8; 4];
        assert!(matches!(
            request_entropy(&mut Closed, &mut out),
            Err(EgdError::WriteError(_))
        ));
    }

    #[test]
    fn test_fetch_rejects_before_connecting() {
        let client = EgdClient::new(Endpoint::Unix("/nonexistent/egd".into()));
        assert!(matches!(
            client.fetch(256),
            Err(EgdError::OutOfRange { requested: 256 })
        ));
        assert!(matches!(
            client.fetch(16),
            Err(EgdError::EndpointUnreachable(_))
        ));
    }

    #[test]
    fn test_fill_out_of_range_is_wiped() {
        let client = EgdClient::new(Endpoint::Unix("/nonexistent/egd".into()));
        let mut out = vec![0xaau8; 256];
        assert!(matches!(
            client.fill(&mut out),
            Err(EgdError::OutOfRange { requested: 256 })
        ));
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_entropy_source_flags() {
        let mut client = EgdClient::new(Endpoint::Unix("/nonexistent/egd".into()));
        assert_eq!(EntropySource::flags(&client).bits(), 0x801);
        let mut out = [0u8; 8];
        assert_eq!(
            EntropySource::fill(&mut client, &mut out),
            Err(StrongRngError::Init)
        );
    }
}
