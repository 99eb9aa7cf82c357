//! Coordination Protocol
//!
//! Request and response records exchanged between slaves and the master.
//! Each record travels as one JSON object on its own line.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Origin label used by the master for its own requests
pub const MASTER_ORIGIN: &str = "master";

/// Fixed read-only query used for registration and liveness probes
pub const PROBE_QUERY: &str = "SELECT 1";

/// Query request sent to the master
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Shared secret
    #[serde(default)]
    pub token: String,
    /// Raw statement text
    #[serde(default)]
    pub query: String,
    /// Sender clock in unix milliseconds (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Claimed origin: "master", a slave identity, or empty for a bare probe
    #[serde(default)]
    pub from_slave: String,
    /// Whether the sender classified the query as a read
    #[serde(default)]
    pub is_select: bool,
}

impl Request {
    /// Build a request, classifying the query by its leading keyword
    pub fn new(token: impl Into<String>, query: impl Into<String>, from: impl Into<String>) -> Self {
        let query = query.into();
        let is_select = crate::policy::is_select(&query);
        Self {
            token: token.into(),
            query,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
            from_slave: from.into(),
            is_select,
        }
    }

    /// Build the fixed probe request used for handshakes and heartbeats
    pub fn probe(token: impl Into<String>, from: impl Into<String>) -> Self {
        Self::new(token, PROBE_QUERY, from)
    }

    /// Whether the origin is a slave that should be tracked by the registry
    pub fn slave_origin(&self) -> Option<&str> {
        match self.from_slave.as_str() {
            "" | MASTER_ORIGIN => None,
            slave => Some(slave),
        }
    }

    /// Encode as a single line (without terminator)
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a line; blank lines yield `None`
    pub fn decode(line: &str) -> Result<Option<Self>> {
        decode_record(line)
    }
}

/// Outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Error => write!(f, "error"),
        }
    }
}

/// Response returned for every processed request.
///
/// `header` and `rows` are both present for successful reads and both
/// absent otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<serde_json::Value>>>,
}

impl Response {
    /// Successful response without a result set
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
            header: None,
            rows: None,
        }
    }

    /// Successful read carrying a result set
    pub fn with_rows(
        message: impl Into<String>,
        header: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    ) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
            header: Some(header),
            rows: Some(rows),
        }
    }

    /// Error response; never carries a result set
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            header: None,
            rows: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Encode as a single line (without terminator)
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a line; blank lines yield `None`
    pub fn decode(line: &str) -> Result<Option<Self>> {
        decode_record(line)
    }
}

impl From<crate::error::Error> for Response {
    fn from(err: crate::error::Error) -> Self {
        Response::error(err.to_string())
    }
}

fn decode_record<T: serde::de::DeserializeOwned>(line: &str) -> Result<Option<T>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Lines that look like an HTTP request sent to the coordination port
pub fn is_http_preamble(line: &str) -> bool {
    ["GET", "POST", "PUT", "DELETE"]
        .iter()
        .any(|verb| line.starts_with(verb))
}
