//! Slave Node Implementation
//!
//! Owns the single persistent session with the master. Every user of the
//! session (queries and the heartbeat) goes through one lock; a failed
//! probe or exchange drops the session and the next user dials again.

use std::net::{IpAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use crate::config::SlaveConfig;
use crate::error::{Error, Result};
use crate::network::{MasterConnection, Request, Response};
use crate::policy;

/// Answer for schema changes attempted through a slave
pub const MASTER_ONLY_MESSAGE: &str =
    "This query can only be executed on the master server. Please use the master server interface.";

/// Connection manager for the slave's session with the master
pub struct ConnectionManager {
    /// Master coordination address
    master_address: String,
    /// Shared secret
    token: String,
    /// Identity reported as `from_slave`
    identity: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    heartbeat_interval: Duration,
    /// The one live session, if any
    connection: Mutex<Option<MasterConnection>>,
    /// Set once the heartbeat task has been spawned
    heartbeat_started: AtomicBool,
    /// Shutdown signal for the heartbeat
    shutdown: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Create a manager; no connection is made until first use
    pub fn new(config: &SlaveConfig, identity: String) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            master_address: config.master_address.clone(),
            token: config.token.clone(),
            identity,
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            connection: Mutex::new(None),
            heartbeat_started: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn master_address(&self) -> &str {
        &self.master_address
    }

    /// Whether a session is currently held
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Verify the session with a probe, or dial and register a new one.
    /// The first success also starts the heartbeat.
    pub async fn ensure_connection(self: &Arc<Self>) -> Result<()> {
        {
            let mut slot = self.connection.lock().await;
            self.ensure_locked(&mut slot).await?;
        }
        self.start_heartbeat();
        Ok(())
    }

    /// Relay a query to the master and return its answer.
    ///
    /// Schema changes are refused locally. Failures are reported as error
    /// responses; transport failures also drop the session.
    pub async fn send_query(self: &Arc<Self>, query: &str) -> Response {
        if policy::is_schema_mutating(query) {
            tracing::warn!(query = %query, "Refusing schema change on slave");
            return Response::error(MASTER_ONLY_MESSAGE);
        }

        let mut slot = self.connection.lock().await;
        if let Err(e) = self.ensure_locked(&mut slot).await {
            tracing::warn!("Failed to connect to master server: {}", e);
            return Response::error(format!("Failed to connect to master server: {}", e));
        }
        self.start_heartbeat();

        let conn = match slot.as_mut() {
            Some(conn) => conn,
            None => return Response::from(Error::NotConnected),
        };

        let request = Request::new(self.token.as_str(), query, self.identity.as_str());
        tracing::debug!(query = %query, "Sending request to master");

        match conn.exchange(&request, self.request_timeout).await {
            Ok(response) => response,
            Err(e) if e.is_transport() => {
                tracing::warn!(master = %self.master_address, "Lost connection to master: {}", e);
                *slot = None;
                Response::error(format!("Failed to communicate with master server: {}", e))
            }
            Err(e) => Response::error(format!("Invalid response from master server: {}", e)),
        }
    }

    /// One heartbeat: probe the session and reconnect if the probe fails
    pub async fn heartbeat(&self) -> Result<()> {
        let mut slot = self.connection.lock().await;

        let probed = match slot.as_mut() {
            Some(conn) => self.probe(conn).await,
            None => Err(Error::NotConnected),
        };

        match probed {
            Ok(()) => {
                tracing::debug!(slave = %self.identity, "Heartbeat successful");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Heartbeat failed: {}", e);
                *slot = None;
                self.ensure_locked(&mut slot).await.map_err(|e| {
                    tracing::warn!("Failed to reconnect to master: {}", e);
                    e
                })
            }
        }
    }

    /// Stop the heartbeat and drop the session
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.connection.lock().await.take();
    }

    async fn ensure_locked(&self, slot: &mut Option<MasterConnection>) -> Result<()> {
        if let Some(conn) = slot.as_mut() {
            match self.probe(conn).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::info!(master = %self.master_address, "Connection probe failed, reconnecting: {}", e);
                    *slot = None;
                }
            }
        }

        let mut conn = MasterConnection::connect(&self.master_address, self.connect_timeout).await?;
        // registration handshake
        self.probe(&mut conn).await?;

        tracing::info!(
            master = %conn.address(),
            slave = %self.identity,
            "Established persistent connection to master"
        );
        *slot = Some(conn);
        Ok(())
    }

    async fn probe(&self, conn: &mut MasterConnection) -> Result<()> {
        let probe = Request::probe(self.token.as_str(), self.identity.as_str());
        let response = conn.exchange(&probe, self.request_timeout).await?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(Error::Network(format!("master rejected probe: {}", response.message)))
        }
    }

    fn start_heartbeat(self: &Arc<Self>) {
        if *self.shutdown.borrow() || self.heartbeat_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.heartbeat_interval);
            ticker.tick().await;

            while !*shutdown.borrow_and_update() {
                tokio::select! {
                    _ = ticker.tick() => {
                        // failures are logged inside and retried next tick
                        let _ = manager.heartbeat().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Heartbeat stopped");
        });
    }
}

/// Identity to report to the master: the outbound IPv4 address, else the
/// hostname, else `"unknown"`
pub fn local_identity() -> String {
    if let Some(ip) = outbound_ipv4() {
        return ip.to_string();
    }

    tracing::info!("No suitable IP address found, using hostname");
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!("Error getting hostname: {}", e);
            "unknown".to_string()
        }
    }
}

fn outbound_ipv4() -> Option<IpAddr> {
    // connect() on UDP only selects a route, nothing is sent
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:9").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    match ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(ip),
        _ => None,
    }
}
