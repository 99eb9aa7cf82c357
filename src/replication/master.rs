//! Master Node Implementation
//!
//! The coordinator answers every request arriving on the coordination
//! port: it checks the shared token, records slave contact, applies the
//! authorization policy and dispatches to the storage engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::MasterConfig;
use crate::error::{Error, Result};
use crate::executor::StorageEngine;
use crate::network::protocol::MASTER_ORIGIN;
use crate::network::{bind_listener, NetworkServer, Request, RequestHandler, Response};
use crate::policy::{self, Decision};
use crate::state::SlaveRegistry;

/// Message for a successful read
pub const SELECT_OK: &str = "Select executed successfully";

/// Per-request coordination logic, shared by every connection
pub struct Coordinator {
    /// Shared secret
    token: String,
    /// Live slaves
    registry: Arc<SlaveRegistry>,
    /// Local storage
    engine: Arc<dyn StorageEngine>,
}

impl Coordinator {
    pub fn new(token: String, registry: Arc<SlaveRegistry>, engine: Arc<dyn StorageEngine>) -> Self {
        Self { token, registry, engine }
    }

    pub fn registry(&self) -> &Arc<SlaveRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Process one request and build its response. Never fails.
    pub async fn process(&self, request: Request) -> Response {
        if request.token != self.token {
            tracing::warn!(from = %request.from_slave, "Rejected request with invalid token");
            return Response::from(Error::InvalidToken);
        }

        if let Some(slave) = request.slave_origin() {
            self.registry.touch(slave).await;
        }

        if let Decision::Deny(reason) = policy::authorize(&request.query, &request.from_slave) {
            tracing::warn!(
                from = %request.from_slave,
                query = %request.query,
                "Unauthorized query attempt: {}", reason
            );
            return Response::from(Error::AuthorizationDenied(reason));
        }

        if request.is_select {
            match self.engine.query_rows(&request.query).await {
                Ok(result) => {
                    tracing::debug!(
                        from = %request.from_slave,
                        rows = result.rows.len(),
                        "SELECT query completed"
                    );
                    Response::with_rows(SELECT_OK, result.columns, result.rows)
                }
                Err(e) => {
                    tracing::warn!(from = %request.from_slave, query = %request.query, "SELECT query failed: {}", e);
                    Response::from(e)
                }
            }
        } else {
            match self.engine.execute_query(&request.query).await {
                Ok(affected) => {
                    tracing::info!(
                        from = %request.from_slave,
                        query = %request.query,
                        rows_affected = affected,
                        "Query executed"
                    );
                    Response::ok(format!(
                        "Query executed successfully. Rows affected: {}",
                        affected
                    ))
                }
                Err(e) => {
                    tracing::warn!(from = %request.from_slave, query = %request.query, "Query execution failed: {}", e);
                    Response::from(e)
                }
            }
        }
    }

    /// Run a statement on behalf of the master itself
    pub async fn execute_local(&self, query: &str) -> Response {
        self.process(Request::new(self.token.clone(), query, MASTER_ORIGIN)).await
    }

    /// Registered slaves and their last contact time
    pub async fn slaves(&self) -> BTreeMap<String, String> {
        self.registry.snapshot().await
    }
}

#[async_trait::async_trait]
impl RequestHandler for Coordinator {
    async fn handle(&self, peer: &str, request: Request) -> Response {
        tracing::trace!(peer = %peer, from = %request.from_slave, "Request received");
        self.process(request).await
    }
}

/// Master node: coordination listener plus the registry sweeper
pub struct MasterNode {
    config: MasterConfig,
    coordinator: Arc<Coordinator>,
    server: NetworkServer,
    shutdown: watch::Sender<bool>,
}

impl MasterNode {
    /// Create a new master node
    pub fn new(config: MasterConfig, engine: Arc<dyn StorageEngine>) -> Self {
        let registry = Arc::new(SlaveRegistry::new());
        let coordinator = Arc::new(Coordinator::new(config.token.clone(), registry, engine));

        let server = NetworkServer::new(
            config.bind_address.clone(),
            coordinator.clone(),
            config.max_line_bytes,
            config.stale_after(),
            config.io_timeout(),
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            coordinator,
            server,
            shutdown,
        }
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Bind the coordination port and serve until stopped
    pub async fn start(&self) -> Result<()> {
        let listener = bind_listener(&self.config.bind_address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until stopped
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let sweeper = self.coordinator.registry().start_sweeper(
            self.config.sweep_interval(),
            self.config.stale_after(),
            self.shutdown.subscribe(),
        );

        tracing::info!(
            sweep_secs = self.config.sweep_interval_secs,
            stale_secs = self.config.stale_after_secs,
            "Master coordinator starting"
        );

        let result = self.server.serve(listener).await;

        self.shutdown.send_replace(true);
        if let Err(e) = sweeper.await {
            tracing::warn!("Sweeper task ended abnormally: {}", e);
        }
        result
    }

    /// Stop accepting connections and end the sweeper
    pub fn stop(&self) {
        tracing::info!("Stopping master coordinator");
        self.server.stop();
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::mock::RecordingEngine;
    use crate::network::{dial, frame, read_line, write_line, Status};
    use crate::policy::MASTER_ONLY_REASON;
    use serde_json::json;
    use std::time::Duration;

    const TOKEN: &str = "secret-token";

    fn coordinator(engine: Arc<RecordingEngine>) -> Coordinator {
        Coordinator::new(TOKEN.to_string(), Arc::new(SlaveRegistry::new()), engine)
    }

    #[tokio::test]
    async fn test_invalid_token_has_no_side_effects() {
        let engine = Arc::new(RecordingEngine::new());
        let coord = coordinator(engine.clone());

        let resp = coord
            .process(Request::new("wrong", "SELECT * FROM shop.items", "10.0.0.5"))
            .await;

        assert_eq!(resp.status, Status::Error);
        assert_eq!(resp.message, "Invalid token");
        assert!(coord.slaves().await.is_empty());
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_schema_change_from_slave_is_denied() {
        let engine = Arc::new(RecordingEngine::new());
        let coord = coordinator(engine.clone());

        let resp = coord
            .process(Request::new(TOKEN, "DROP TABLE shop.items", "10.0.0.5"))
            .await;

        assert!(!resp.is_ok());
        assert_eq!(resp.message, MASTER_ONLY_REASON);
        assert_eq!(engine.call_count(), 0);
        // contact is still recorded
        assert!(coord.slaves().await.contains_key("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_schema_change_from_master_is_executed() {
        let engine = Arc::new(RecordingEngine::new());
        let coord = coordinator(engine.clone());

        let resp = coord.execute_local("CREATE DATABASE shop").await;

        assert!(resp.is_ok());
        assert_eq!(resp.message, "Query executed successfully. Rows affected: 0");
        assert_eq!(engine.calls(), vec!["CREATE DATABASE shop"]);
        assert!(coord.slaves().await.is_empty());
    }

    #[tokio::test]
    async fn test_select_returns_result_set() {
        let engine = Arc::new(
            RecordingEngine::new().with_rows(&["id", "label"], vec![vec![json!(1), json!("x")]]),
        );
        let coord = coordinator(engine.clone());

        let resp = coord
            .process(Request::new(TOKEN, "SELECT id, label FROM shop.items", "10.0.0.5"))
            .await;

        assert!(resp.is_ok());
        assert_eq!(resp.message, SELECT_OK);
        assert_eq!(resp.header.unwrap(), vec!["id", "label"]);
        assert_eq!(resp.rows.unwrap(), vec![vec![json!(1), json!("x")]]);
    }

    #[tokio::test]
    async fn test_mutation_reports_affected_rows() {
        let engine = Arc::new(RecordingEngine::new().with_affected(3));
        let coord = coordinator(engine);

        let resp = coord
            .process(Request::new(TOKEN, "UPDATE shop.items SET a = 1", "10.0.0.5"))
            .await;

        assert!(resp.is_ok());
        assert_eq!(resp.message, "Query executed successfully. Rows affected: 3");
        assert!(resp.header.is_none() && resp.rows.is_none());
    }

    #[tokio::test]
    async fn test_engine_error_becomes_response() {
        let engine = Arc::new(RecordingEngine::new().failing("Table 'shop.nope' doesn't exist"));
        let coord = coordinator(engine);

        let resp = coord
            .process(Request::new(TOKEN, "SELECT * FROM shop.nope", "10.0.0.5"))
            .await;

        assert_eq!(resp.status, Status::Error);
        assert_eq!(resp.message, "Table 'shop.nope' doesn't exist");
        assert!(resp.rows.is_none());
    }

    #[tokio::test]
    async fn test_bare_probe_does_not_register() {
        let coord = coordinator(Arc::new(RecordingEngine::new()));
        let resp = coord.process(Request::probe(TOKEN, "")).await;
        assert!(resp.is_ok());
        assert!(coord.slaves().await.is_empty());
    }

    #[tokio::test]
    async fn test_master_node_serves_over_tcp() {
        let engine = Arc::new(RecordingEngine::new());
        let node = Arc::new(MasterNode::new(MasterConfig::default(), engine.clone()));
        let listener = bind_listener("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let serving = Arc::clone(&node);
        let handle = tokio::spawn(async move { serving.serve(listener).await });

        let mut framed = frame(dial(&addr).await.unwrap(), 1024 * 1024);
        let bad = Request::new("wrong", "SELECT 1", "10.0.0.7");
        write_line(&mut framed, bad.encode().unwrap()).await.unwrap();
        let reply = read_line(&mut framed).await.unwrap().unwrap();
        assert_eq!(Response::decode(&reply).unwrap().unwrap().message, "Invalid token");

        // the connection stays open after a rejected token
        let probe = Request::probe(TOKEN, "10.0.0.7");
        write_line(&mut framed, probe.encode().unwrap()).await.unwrap();
        let reply = read_line(&mut framed).await.unwrap().unwrap();
        assert!(Response::decode(&reply).unwrap().unwrap().is_ok());
        assert!(node.coordinator().slaves().await.contains_key("10.0.0.7"));

        node.stop();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_serve_ends_server_and_sweeper() {
        let node = MasterNode::new(MasterConfig::default(), Arc::new(RecordingEngine::new()));
        let listener = bind_listener("127.0.0.1:0").await.unwrap();

        node.stop();
        let result = tokio::time::timeout(Duration::from_secs(2), node.serve(listener)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
