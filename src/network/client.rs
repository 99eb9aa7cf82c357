//! Network Client
//!
//! A single TCP session from a slave to the master.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::protocol::{Request, Response};
use super::{dial, frame, read_line, write_line, LineStream};
use crate::error::{Error, Result};

/// Longest response line accepted from the master
const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// One live session with the master
pub struct MasterConnection {
    address: String,
    framed: LineStream<TcpStream>,
}

impl MasterConnection {
    /// Dial the master
    pub async fn connect(address: &str, connect_timeout: Duration) -> Result<Self> {
        let result = timeout(connect_timeout, dial(address)).await;

        match result {
            Ok(Ok(stream)) => Ok(Self {
                address: address.to_string(),
                framed: frame(stream, MAX_RESPONSE_BYTES),
            }),
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Master address this session is connected to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send a request and read exactly one response line
    pub async fn exchange(&mut self, request: &Request, deadline: Duration) -> Result<Response> {
        let line = request.encode()?;
        let address = self.address.clone();

        let reply = timeout(deadline, async {
            write_line(&mut self.framed, line).await?;
            read_line(&mut self.framed).await
        })
        .await
        .map_err(|_| Error::ConnectionTimeout(address))??;

        let reply = reply.ok_or_else(|| Error::Network("master closed the connection".into()))?;
        Response::decode(&reply)?
            .ok_or_else(|| Error::Internal("empty response line".into()))
    }
}
