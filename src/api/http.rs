//! HTTP API Server
//!
//! Thin JSON surface over the coordinator (master) or the connection
//! manager (slave): query submission, registry inspection, schema
//! management and replication apply.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ApiConfig, NodeRole};
use crate::executor::{CreateTableRequest, StorageEngine};
use crate::network::Response;
use crate::policy::{self, Decision};
use crate::replication::{ConnectionManager, Coordinator, ReplicationApplier, ReplicationOp};
use crate::error::{Error, Result};

/// Message for schema changes sent to a slave's HTTP API
pub const SLAVE_SCHEMA_REFUSAL: &str =
    "CREATE and DROP operations are only allowed on the master server";

/// The node the API fronts
#[derive(Clone)]
pub enum NodeHandle {
    Master(Arc<Coordinator>),
    Slave(Arc<ConnectionManager>),
}

impl NodeHandle {
    pub fn role(&self) -> NodeRole {
        match self {
            NodeHandle::Master(_) => NodeRole::Master,
            NodeHandle::Slave(_) => NodeRole::Slave,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Master or slave
    pub node: NodeHandle,
    /// Local storage, used for schema management and health
    pub engine: Arc<dyn StorageEngine>,
    /// Applies replicated changes to local storage
    pub applier: ReplicationApplier,
    /// This node's own address, used for role discovery
    pub local_ip: Option<IpAddr>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    bind_address: String,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(
        config: ApiConfig,
        bind_address: String,
        node: NodeHandle,
        engine: Arc<dyn StorageEngine>,
        local_ip: Option<IpAddr>,
    ) -> Self {
        let state = Arc::new(AppState {
            node,
            applier: ReplicationApplier::new(Arc::clone(&engine)),
            engine,
            local_ip,
        });

        Self {
            config,
            bind_address,
            state,
        }
    }

    /// Build the router for this node's role
    pub fn router(&self) -> Router {
        Self::create_router(Arc::clone(&self.state), self.config.cors_enabled)
    }

    fn create_router(state: Arc<AppState>, cors: bool) -> Router {
        let mut router = Router::new()
            .route("/api/query", post(handle_query))
            .route("/api/replicate", post(handle_replicate))
            .route("/connect", post(handle_connect))
            .route("/health", get(handle_health));

        if let NodeHandle::Master(_) = state.node {
            router = router
                .route("/api/slaves", get(handle_slaves))
                .route("/api/database/create", post(handle_create_database))
                .route("/api/table/create", post(handle_create_table));
        }

        let router = router.with_state(state).layer(TraceLayer::new_for_http());
        if cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Query submission
#[derive(Debug, Deserialize, Serialize)]
pub struct QueryRequest {
    pub query: String,
    /// Declared caller role; `slave` callers may only read
    #[serde(default)]
    pub role: Option<String>,
}

/// Database creation request
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateDatabaseRequest {
    pub db_name: String,
}

/// Role discovery request
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub ip: String,
}

/// Role discovery response
#[derive(Debug, Deserialize, Serialize)]
pub struct ConnectResponse {
    pub status: String,
    pub message: String,
    pub role: NodeRole,
}

/// Health response
#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub role: NodeRole,
    pub database: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_to_master: Option<bool>,
}

// ============ Handlers ============

async fn handle_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> impl IntoResponse {
    match &state.node {
        NodeHandle::Master(coordinator) => {
            if let Decision::Deny(reason) = policy::authorize_http(&req.query, req.role.as_deref()) {
                tracing::warn!(query = %req.query, "HTTP query refused: {}", reason);
                return Json(Response::error(reason)).into_response();
            }
            let response = coordinator.execute_local(&req.query).await;
            tracing::info!(status = %response.status, "HTTP query completed");
            Json(response).into_response()
        }
        NodeHandle::Slave(manager) => {
            if policy::is_schema_mutating(&req.query) {
                return (StatusCode::FORBIDDEN, SLAVE_SCHEMA_REFUSAL).into_response();
            }
            Json(manager.send_query(&req.query).await).into_response()
        }
    }
}

async fn handle_slaves(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, String>> {
    match &state.node {
        NodeHandle::Master(coordinator) => Json(coordinator.slaves().await),
        NodeHandle::Slave(_) => Json(BTreeMap::new()),
    }
}

async fn handle_create_database(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDatabaseRequest>,
) -> Json<Response> {
    tracing::info!(db_name = %req.db_name, "Creating database");
    match state.engine.create_database(&req.db_name).await {
        Ok(()) => Json(Response::ok(format!("Database {} created successfully", req.db_name))),
        Err(e) => {
            tracing::error!(db_name = %req.db_name, "Database creation failed: {}", e);
            Json(Response::error(format!("Failed to create database: {}", e)))
        }
    }
}

async fn handle_create_table(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTableRequest>,
) -> Json<Response> {
    tracing::info!(db_name = %req.db_name, table_name = %req.table_name, "Creating table");
    match state.engine.create_table(&req).await {
        Ok(()) => Json(Response::ok(format!(
            "Table {} created successfully in database {}",
            req.table_name, req.db_name
        ))),
        Err(e) => {
            tracing::error!(table_name = %req.table_name, "Table creation failed: {}", e);
            Json(Response::error(format!("Failed to create table: {}", e)))
        }
    }
}

async fn handle_replicate(
    State(state): State<Arc<AppState>>,
    Json(op): Json<ReplicationOp>,
) -> impl IntoResponse {
    match state.applier.apply(&op).await {
        Ok(_) => (
            StatusCode::OK,
            Json(Response::ok(format!(
                "Data replicated successfully for operation {}",
                op.operation
            ))),
        ),
        Err(e) => {
            tracing::error!(operation = %op.operation, "Replication failed: {}", e);
            let status = match e {
                Error::UnsupportedOperation(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(Response::error(format!("Failed to replicate data: {}", e))))
        }
    }
}

async fn handle_connect(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ConnectRequest>>,
) -> Json<ConnectResponse> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let role = match state.node {
        NodeHandle::Master(_) => match req.ip.parse::<IpAddr>() {
            Ok(ip) if ip.is_loopback() || Some(ip) == state.local_ip => NodeRole::Master,
            _ => NodeRole::Slave,
        },
        NodeHandle::Slave(_) => NodeRole::Slave,
    };

    Json(ConnectResponse {
        status: "ok".to_string(),
        message: "Connected successfully".to_string(),
        role,
    })
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = state.engine.health_check().await.unwrap_or(false);
    let connected_to_master = match &state.node {
        NodeHandle::Master(_) => None,
        NodeHandle::Slave(manager) => Some(manager.is_connected().await),
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            healthy: database,
            role: state.node.role(),
            database,
            connected_to_master,
        }),
    )
}
