//! RelayDB Configuration
//!
//! Configuration structures for master and slave nodes, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main RelayDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Database connection configuration
    pub database: DatabaseConfig,

    /// Master coordination settings
    #[serde(default)]
    pub master: MasterConfig,

    /// Slave connection settings
    #[serde(default)]
    pub slave: SlaveConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Role of this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Slave,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Slave => write!(f, "slave"),
        }
    }
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Whether this node coordinates (master) or relays (slave)
    pub role: NodeRole,

    /// Identity reported to the master as `from_slave`
    /// (defaults to the first non-loopback IPv4 address)
    #[serde(default)]
    pub identity: Option<String>,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// MariaDB host
    pub host: String,

    /// MariaDB port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Master coordination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Address the coordination listener binds to
    #[serde(default = "default_master_address")]
    pub bind_address: String,

    /// Shared secret every request must carry
    #[serde(default = "default_token")]
    pub token: String,

    /// How often stale slaves are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Slaves silent for longer than this are evicted, in seconds
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Per-request read/write deadline, in seconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    /// Longest accepted request line in bytes
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

/// Slave connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveConfig {
    /// Master coordination address (host:port)
    #[serde(default = "default_master_target")]
    pub master_address: String,

    /// Shared secret sent with every request
    #[serde(default = "default_token")]
    pub token: String,

    /// Heartbeat interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Dial timeout in seconds
    #[serde(default = "default_slave_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Deadline for one request/response exchange, in seconds
    #[serde(default = "default_io_timeout")]
    pub request_timeout_secs: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address (defaults depend on the node role)
    #[serde(default)]
    pub bind_address: Option<String>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_db_port() -> u16 {
    3306
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_master_address() -> String {
    "0.0.0.0:8083".to_string()
}

fn default_master_target() -> String {
    "localhost:8083".to_string()
}

fn default_token() -> String {
    "secret-token".to_string()
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_stale_after() -> u64 {
    120
}

fn default_io_timeout() -> u64 {
    30
}

fn default_max_line_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_slave_connect_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind_address: default_master_address(),
            token: default_token(),
            sweep_interval_secs: default_sweep_interval(),
            stale_after_secs: default_stale_after(),
            io_timeout_secs: default_io_timeout(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            master_address: default_master_target(),
            token: default_token(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            connect_timeout_secs: default_slave_connect_timeout(),
            request_timeout_secs: default_io_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: None,
            cors_enabled: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl MasterConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

impl SlaveConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.database.host.is_empty() {
            return Err(crate::Error::Config("database.host cannot be empty".into()));
        }

        match self.node.role {
            NodeRole::Master => {
                let master = &self.master;
                if master.bind_address.is_empty() {
                    return Err(crate::Error::Config("master.bind_address cannot be empty".into()));
                }
                if master.token.is_empty() {
                    return Err(crate::Error::Config("master.token cannot be empty".into()));
                }
                if master.sweep_interval_secs == 0 || master.io_timeout_secs == 0 {
                    return Err(crate::Error::Config(
                        "master intervals must be greater than zero".into(),
                    ));
                }
                if master.stale_after_secs < master.sweep_interval_secs {
                    return Err(crate::Error::Config(
                        "master.stale_after_secs must be at least master.sweep_interval_secs".into(),
                    ));
                }
            }
            NodeRole::Slave => {
                let slave = &self.slave;
                if slave.master_address.is_empty() {
                    return Err(crate::Error::Config("slave.master_address cannot be empty".into()));
                }
                if slave.token.is_empty() {
                    return Err(crate::Error::Config("slave.token cannot be empty".into()));
                }
                if slave.heartbeat_interval_secs == 0 || slave.request_timeout_secs == 0 {
                    return Err(crate::Error::Config(
                        "slave intervals must be greater than zero".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// HTTP API bind address, falling back to the role default
    pub fn api_address(&self) -> String {
        match &self.api.bind_address {
            Some(addr) => addr.clone(),
            None => match self.node.role {
                NodeRole::Master => "0.0.0.0:8082".to_string(),
                NodeRole::Slave => "0.0.0.0:8084".to_string(),
            },
        }
    }

    /// Get database server URL (no default schema; statements are qualified)
    pub fn database_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}",
            self.database.user, self.database.password, self.database.host, self.database.port
        )
    }
}
