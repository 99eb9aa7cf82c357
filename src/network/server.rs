//! Network Server
//!
//! TCP listener for the master's coordination port. Each accepted
//! connection gets its own task that reads request lines in order and
//! answers each one before reading the next.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::protocol::{is_http_preamble, Request, Response};
use super::{bind_listener, frame, read_line, write_line};
use crate::error::{Error, Result};

/// Processes one decoded request from a peer
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, peer: &str, request: Request) -> Response;
}

/// Network server for slave connections
pub struct NetworkServer {
    /// Bind address
    bind_address: String,
    /// Request handler
    handler: Arc<dyn RequestHandler>,
    /// Longest accepted line
    max_line_bytes: usize,
    /// How long a connection may sit idle between requests
    idle_timeout: Duration,
    /// Deadline for writing one response
    write_timeout: Duration,
    /// Shutdown signal
    shutdown: watch::Sender<bool>,
}

impl NetworkServer {
    /// Create a new network server
    pub fn new(
        bind_address: String,
        handler: Arc<dyn RequestHandler>,
        max_line_bytes: usize,
        idle_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            bind_address,
            handler,
            max_line_bytes,
            idle_timeout,
            write_timeout,
            shutdown: shutdown_tx,
        }
    }

    /// Bind and serve until stopped
    pub async fn start(&self) -> Result<()> {
        let listener = bind_listener(&self.bind_address).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!("Coordination server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        // a stop issued before we subscribed is not reported by changed()
        while !*shutdown_rx.borrow_and_update() {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let peer_addr = addr.to_string();
                            let session = Session {
                                handler: Arc::clone(&self.handler),
                                max_line_bytes: self.max_line_bytes,
                                idle_timeout: self.idle_timeout,
                                write_timeout: self.write_timeout,
                                shutdown: self.shutdown.subscribe(),
                            };

                            tracing::info!(peer = %peer_addr, "New slave connection");
                            tokio::spawn(async move {
                                match session.run(socket, &peer_addr).await {
                                    Ok(()) => tracing::info!(peer = %peer_addr, "Slave disconnected"),
                                    Err(e) => tracing::warn!(peer = %peer_addr, "Connection error: {}", e),
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Coordination server stopped");
        Ok(())
    }

    /// Stop the server and close open connections
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Per-connection state
struct Session {
    handler: Arc<dyn RequestHandler>,
    max_line_bytes: usize,
    idle_timeout: Duration,
    write_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Session {
    async fn run(mut self, socket: TcpStream, peer_addr: &str) -> Result<()> {
        socket.set_nodelay(true)?;
        let mut framed = frame(socket, self.max_line_bytes);

        loop {
            if *self.shutdown.borrow_and_update() {
                return Err(Error::ShuttingDown);
            }

            let line = tokio::select! {
                read = tokio::time::timeout(self.idle_timeout, read_line(&mut framed)) => {
                    match read {
                        Ok(Ok(Some(line))) => line,
                        Ok(Ok(None)) => return Ok(()),
                        Ok(Err(e)) => return Err(e),
                        Err(_) => return Err(Error::ConnectionTimeout(peer_addr.to_string())),
                    }
                }
                _ = self.shutdown.changed() => {
                    return Err(Error::ShuttingDown);
                }
            };

            if is_http_preamble(&line) {
                tracing::debug!(peer = %peer_addr, "Ignoring HTTP request line on coordination port");
                continue;
            }

            let response = match Request::decode(&line) {
                Ok(Some(request)) => self.handler.handle(peer_addr, request).await,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(peer = %peer_addr, "Invalid request: {}", e);
                    Response::from(e)
                }
            };

            let encoded = response.encode()?;
            match tokio::time::timeout(self.write_timeout, write_line(&mut framed, encoded)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(Error::ConnectionTimeout(peer_addr.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{dial, LineStream};

    struct Echo;

    #[async_trait::async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, _peer: &str, request: Request) -> Response {
            Response::ok(request.query)
        }
    }

    async fn start_echo() -> (Arc<NetworkServer>, String) {
        let server = Arc::new(NetworkServer::new(
            "127.0.0.1:0".to_string(),
            Arc::new(Echo),
            1024,
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        let listener = bind_listener("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let srv = Arc::clone(&server);
        tokio::spawn(async move { srv.serve(listener).await });
        (server, addr)
    }

    async fn roundtrip(framed: &mut LineStream, line: &str) -> Response {
        write_line(framed, line.to_string()).await.unwrap();
        let reply = read_line(framed).await.unwrap().unwrap();
        Response::decode(&reply).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_answers_in_order_and_survives_bad_lines() {
        let (server, addr) = start_echo().await;
        let mut framed = frame(dial(&addr).await.unwrap(), 1024);

        let bad = roundtrip(&mut framed, "{oops").await;
        assert!(!bad.is_ok());
        assert!(bad.message.starts_with("Invalid request format"));

        // HTTP noise gets no answer; the next reply belongs to the next request
        write_line(&mut framed, "GET / HTTP/1.1".into()).await.unwrap();
        let first = roundtrip(&mut framed, r#"{"query":"one"}"#).await;
        let second = roundtrip(&mut framed, r#"{"query":"two"}"#).await;
        assert_eq!(first.message, "one");
        assert_eq!(second.message, "two");

        server.stop();
    }

    #[tokio::test]
    async fn test_oversized_line_closes_connection() {
        let (server, addr) = start_echo().await;
        let mut framed = frame(dial(&addr).await.unwrap(), 4096);

        write_line(&mut framed, "x".repeat(2048)).await.unwrap();
        let next = read_line(&mut framed).await;
        assert!(matches!(next, Ok(None) | Err(_)));

        server.stop();
    }

    #[tokio::test]
    async fn test_framing_failure_leaves_other_connections_served() {
        let (server, addr) = start_echo().await;
        let mut healthy = frame(dial(&addr).await.unwrap(), 4096);
        let mut broken = frame(dial(&addr).await.unwrap(), 4096);

        assert_eq!(roundtrip(&mut healthy, r#"{"query":"before"}"#).await.message, "before");

        write_line(&mut broken, "x".repeat(2048)).await.unwrap();
        let next = read_line(&mut broken).await;
        assert!(matches!(next, Ok(None) | Err(_)));

        assert_eq!(roundtrip(&mut healthy, r#"{"query":"after"}"#).await.message, "after");

        // new connections are still accepted
        let mut fresh = frame(dial(&addr).await.unwrap(), 4096);
        assert_eq!(roundtrip(&mut fresh, r#"{"query":"fresh"}"#).await.message, "fresh");

        server.stop();
    }

    #[tokio::test]
    async fn test_stop_before_serve_returns() {
        let server = NetworkServer::new(
            "127.0.0.1:0".to_string(),
            Arc::new(Echo),
            1024,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        let listener = bind_listener("127.0.0.1:0").await.unwrap();

        server.stop();
        let result = tokio::time::timeout(Duration::from_secs(2), server.serve(listener)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
