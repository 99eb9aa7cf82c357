//! Network Module
//!
//! Handles the line-delimited TCP transport between slaves and the master.

pub mod protocol;
mod server;
mod client;

pub use server::{NetworkServer, RequestHandler};
pub use client::MasterConnection;
pub use protocol::{Request, Response, Status};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::error::{Error, Result};

/// A TCP stream split into newline-terminated records
pub type LineStream<S = TcpStream> = Framed<S, LinesCodec>;

/// Wrap a stream in the line codec
pub fn frame<S: AsyncRead + AsyncWrite>(stream: S, max_line_bytes: usize) -> LineStream<S> {
    Framed::new(stream, LinesCodec::new_with_max_length(max_line_bytes))
}

/// Read the next non-blank line. Returns `None` at end of stream.
///
/// Framing failures (oversized line, invalid UTF-8, I/O) are errors; the
/// connection cannot be resynchronised after them.
pub async fn read_line<S>(framed: &mut LineStream<S>) -> Result<Option<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match framed.next().await {
            None => return Ok(None),
            Some(Ok(line)) if line.trim().is_empty() => continue,
            Some(Ok(line)) => return Ok(Some(line)),
            Some(Err(e)) => return Err(codec_error(e)),
        }
    }
}

/// Write one line and flush it
pub async fn write_line<S>(framed: &mut LineStream<S>, line: String) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(line).await.map_err(codec_error)
}

fn codec_error(err: LinesCodecError) -> Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            Error::Network("line exceeds maximum record length".into())
        }
        LinesCodecError::Io(e) => Error::Io(e),
    }
}

/// Bind a listener whose accepted sockets inherit TCP keep-alive
pub async fn bind_listener(address: &str) -> Result<TcpListener> {
    let addr = tokio::net::lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| Error::Config(format!("cannot resolve bind address {}", address)))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_keepalive(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(1024)?)
}

/// Dial a peer with keep-alive and no-delay enabled
pub async fn dial(address: &str) -> std::io::Result<TcpStream> {
    let addr = tokio::net::lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("cannot resolve {}", address))
        })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_skips_blank_lines() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = frame(client, 1024);
        let mut reader = frame(server, 1024);

        write_line(&mut writer, String::new()).await.unwrap();
        write_line(&mut writer, "{\"query\":\"SELECT 1\"}".into()).await.unwrap();
        drop(writer);

        assert_eq!(
            read_line(&mut reader).await.unwrap().as_deref(),
            Some("{\"query\":\"SELECT 1\"}")
        );
        assert!(read_line(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_line_is_framing_error() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = frame(client, 4096);
        let mut reader = frame(server, 16);

        write_line(&mut writer, "x".repeat(64)).await.unwrap();
        let err = read_line(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_dial_failure() {
        let listener = bind_listener("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(dial(&addr.to_string()).await.is_err());
    }
}
