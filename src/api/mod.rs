//! HTTP API Module
//!
//! Provides the REST surface for queries, slave listing and schema management.

mod http;

pub use http::{
    AppState, ConnectRequest, ConnectResponse, CreateDatabaseRequest, HealthResponse, HttpServer,
    NodeHandle, QueryRequest, SLAVE_SCHEMA_REFUSAL,
};
