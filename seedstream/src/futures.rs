// SPDX-License-Identifier: CC0-1.0

//! Future-based asynchronous interfaces for requesting entropy from an EGD
//! over AsyncRead/AsyncWrite transports.
//! It is only available when the `tokio` feature is enabled.
//!
//! No timeout is applied, wrap calls in `tokio::time::timeout` to bound them.
//!
//! # Example
//!
//! ```no_run
//! use seedstream::futures::fetch;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = "127.0.0.1:7000".parse()?;
//! let seed = fetch(&endpoint, 32).await?;
//! println!("Received {} bytes", seed.len());
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::vec;
use std::vec::Vec;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::egd::{wipe, EgdError, Endpoint, Request, ResponseReader};

/// Request `len` bytes of entropy from the daemon at `endpoint`.
///
/// This function is *not* cancellation safe, a dropped future leaves no
/// entropy behind but the session is lost.
///
/// # Errors
///
/// * `OutOfRange` - More than 255 bytes, nothing is sent.
/// * `EndpointUnreachable` - Could not connect.
/// * `WriteError`, `NoData`, `Truncated`, `ShortOutput` - The exchange failed.
pub async fn fetch(endpoint: &Endpoint, len: usize) -> Result<Vec<u8>, EgdError> {
    Request::new(len)?;
    let mut out = vec![0u8; len];

    debug!("Connecting to EGD at {endpoint}.");
    match endpoint {
        Endpoint::Tcp(addr) => {
            let mut stream = TcpStream::connect(addr)
                .await
                .map_err(EgdError::EndpointUnreachable)?;
            let result = request_entropy(&mut stream, &mut out).await;
            // The peer may already be gone.
            let _ = stream.shutdown().await;
            result?;
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let mut stream = UnixStream::connect(path)
                .await
                .map_err(EgdError::EndpointUnreachable)?;
            let result = request_entropy(&mut stream, &mut out).await;
            let _ = stream.shutdown().await;
            result?;
        }
    }
    debug!("Closed EGD session with {endpoint}.");
    Ok(out)
}

/// Run one request/response exchange over an already connected stream.
///
/// The stream is left open. Bytes the daemon sends after the entropy are not
/// read. On failure `out` is zeroed.
pub async fn request_entropy<S>(stream: &mut S, out: &mut [u8]) -> Result<(), EgdError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = exchange(stream, out).await;
    if result.is_err() {
        wipe(out);
    }
    result
}

async fn exchange<S>(stream: &mut S, out: &mut [u8]) -> Result<(), EgdError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = Request::new(out.len())?;
    stream
        .write_all(&request.to_bytes())
        .await
        .map_err(EgdError::WriteError)?;
    stream.flush().await.map_err(EgdError::WriteError)?;
    debug!("Requested {} bytes of entropy.", request.len());

    let mut reader = ResponseReader::new(out)?;
    while let Some(buffer) = reader.buffer() {
        match stream.read(buffer).await {
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_request_entropy_over_duplex() {
        let (mut client, mut daemon) = duplex(64);
        let server = tokio::spawn(async move {
            let mut request = [0u8; 2];
            daemon.read_exact(&mut request).await.unwrap();
            daemon.write_all(&[3, b'S', b'o', b'r']).await.unwrap();
            request
        });
        let mut out = [0u8; 3];
        request_entropy(&mut client, &mut out).await.unwrap();
        assert_eq!(&out, b"Sor");
        assert_eq!(server.await.unwrap(), [0x01, 3]);
    }

    #[tokio::test]
    async fn test_truncated_over_duplex() {
        let (mut client, mut daemon) = duplex(64);
        tokio::spawn(async move {
            let mut request = [0u8; 2];
            daemon.read_exact(&mut request).await.unwrap();
            daemon.write_all(&[8, 1, 2]).await.unwrap();
        });
        let mut out = [0xffu8; 8];
        assert!(matches!(
            request_entropy(&mut client, &mut out).await,
            Err(EgdError::Truncated {
                expected: 8,
                received: 2
            })
        ));
        assert_eq!(out, [0u8; 8]);
    }

    #[tokio::test]
    async fn test_fetch_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::Tcp(listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2];
            stream.read_exact(&mut request).await.unwrap();
            let mut reply = vec![request[1]];
            reply.extend((0..request[1]).map(|i| i.wrapping_mul(7)));
            stream.write_all(&reply).await.unwrap();
        });
        let out = fetch(&endpoint, 200).await.unwrap();
        assert_eq!(out.len(), 200);
        assert_eq!(out[10], 70);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_out_of_range() {
        let endpoint = Endpoint::Tcp("127.0.0.1:1".parse().unwrap());
        assert!(matches!(
            fetch(&endpoint, 256).await,
            Err(EgdError::OutOfRange { requested: 256 })
        ));
    }
}
