//! RelayDB - Master/Slave Coordination for MariaDB
//!
//! Runs a node as the master (coordination listener, slave registry and
//! schema authority) or as a slave (persistent relay to the master).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaydb::api::{HttpServer, NodeHandle};
use relaydb::config::{NodeRole, RelayConfig};
use relaydb::error::Result;
use relaydb::executor::MariaDbExecutor;
use relaydb::network::Response;
use relaydb::replication::{local_identity, ConnectionManager, MasterNode};

/// Width of one column in the interactive result table
const COLUMN_WIDTH: usize = 20;

/// RelayDB - Master/Slave Coordination for MariaDB
#[derive(Parser)]
#[command(name = "relaydb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "relaydb.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as the master node
    Master,

    /// Run as a slave node with an interactive query prompt
    Slave,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "relaydb.toml")]
        output: PathBuf,

        /// Role the generated file is for
        #[arg(long, value_enum, default_value_t = NodeRole::Slave)]
        role: NodeRole,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Master => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_master(config).await
        }
        Commands::Slave => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_slave(config).await
        }
        Commands::Init { output, role } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_init(output, role)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_validate(cli.config)
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load the config file and start logging with its settings
fn load_config(path: &Path, level_override: Option<&str>) -> Result<RelayConfig> {
    match RelayConfig::from_file(path) {
        Ok(config) => {
            let level = level_override.unwrap_or(&config.logging.level);
            init_logging(level, &config.logging.format);
            Ok(config)
        }
        Err(e) => {
            init_logging(level_override.unwrap_or("info"), "pretty");
            tracing::error!("Failed to load configuration from {:?}: {}", path, e);
            Err(e)
        }
    }
}

/// Start the master node
async fn run_master(config: RelayConfig) -> Result<()> {
    if config.node.role != NodeRole::Master {
        tracing::warn!("Configuration role is {}, starting as master anyway", config.node.role);
    }
    tracing::info!("Starting RelayDB master...");

    let executor = match MariaDbExecutor::new(&config.database_url(), &config.database).await {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            return Err(e);
        }
    };
    tracing::info!("Connected to MariaDB at {}:{}", config.database.host, config.database.port);

    let master = Arc::new(MasterNode::new(config.master.clone(), executor.clone()));

    let http_server = HttpServer::new(
        config.api.clone(),
        config.api_address(),
        NodeHandle::Master(master.coordinator()),
        executor.clone(),
        local_identity().parse().ok(),
    );
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        result = master.start() => {
            if let Err(e) = result {
                tracing::error!("Coordination server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    master.stop();
    http_task.abort();
    executor.close().await;
    tracing::info!("Master stopped");
    Ok(())
}

/// Start a slave node
async fn run_slave(config: RelayConfig) -> Result<()> {
    if config.node.role != NodeRole::Slave {
        tracing::warn!("Configuration role is {}, starting as slave anyway", config.node.role);
    }

    let executor = match MariaDbExecutor::new(&config.database_url(), &config.database).await {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to initialize database handler: {}", e);
            return Err(e);
        }
    };

    let identity = config.node.identity.clone().unwrap_or_else(local_identity);
    tracing::info!(slave = %identity, master = %config.slave.master_address, "Connecting to master server...");

    let manager = Arc::new(ConnectionManager::new(&config.slave, identity));
    match manager.ensure_connection().await {
        Ok(()) => tracing::info!("Successfully connected to master server"),
        Err(e) => {
            tracing::warn!("Failed to connect to master server: {}", e);
            tracing::info!("Will retry connection when sending queries");
        }
    }

    let http_server = HttpServer::new(
        config.api.clone(),
        config.api_address(),
        NodeHandle::Slave(Arc::clone(&manager)),
        executor.clone(),
        None,
    );
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    println!("Slave started. Type your SQL query (or 'exit' to quit):");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                None
            }
        };

        let Some(line) = line else { break };
        let query = line.trim();
        if query == "exit" {
            break;
        }
        if query.is_empty() {
            continue;
        }

        let response = manager.send_query(query).await;
        if response.is_ok() {
            println!("Success: {}", response.message);
            print_table(&response);
        } else {
            println!("Error: {}", response.message);
        }
    }

    println!("Exiting...");
    manager.shutdown().await;
    http_task.abort();
    executor.close().await;
    Ok(())
}

/// Print a result set as fixed-width columns
fn print_table(response: &Response) {
    let (Some(header), Some(rows)) = (&response.header, &response.rows) else {
        return;
    };
    if rows.is_empty() {
        return;
    }

    let rule = "-".repeat(COLUMN_WIDTH);
    let mut out = String::new();
    for column in header {
        out.push_str(&format!("{:<width$}", column, width = COLUMN_WIDTH));
    }
    out.push('\n');
    for _ in header {
        out.push_str(&format!("{:<width$}", rule, width = COLUMN_WIDTH));
    }
    out.push('\n');
    for row in rows {
        for value in row {
            let cell = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => "NULL".to_string(),
                other => other.to_string(),
            };
            out.push_str(&format!("{:<width$}", cell, width = COLUMN_WIDTH));
        }
        out.push('\n');
    }
    print!("{}", out);
}

/// Initialize configuration
fn run_init(output: PathBuf, role: NodeRole) -> Result<()> {
    let config_content = format!(r#"# RelayDB Configuration
# Generated configuration file

[node]
role = "{role}"
# identity reported to the master (defaults to this host's IPv4 address)
# identity = "10.0.0.5"

[database]
host = "127.0.0.1"
port = 3306
user = "relaydb"
password = "changeme"
pool_size = 10
connect_timeout_secs = 30

[master]
# coordination listener (master only)
bind_address = "0.0.0.0:8083"
token = "secret-token"
sweep_interval_secs = 30
stale_after_secs = 120
io_timeout_secs = 30

[slave]
# coordination target (slave only)
master_address = "localhost:8083"
token = "secret-token"
heartbeat_interval_secs = 30
connect_timeout_secs = 10
request_timeout_secs = 30

[api]
enabled = true
# defaults to 0.0.0.0:8082 on the master and 0.0.0.0:8084 on a slave
# bind_address = "0.0.0.0:8082"
cors_enabled = true

[logging]
level = "info"
format = "pretty"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your database and master settings.");
    println!("Then start with: relaydb --config {} {}", output.display(), role);

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match RelayConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Role: {}", config.node.role);
            println!("  Database: {}@{}:{}",
                config.database.user,
                config.database.host,
                config.database.port);
            match config.node.role {
                NodeRole::Master => {
                    println!("  Coordination: {}", config.master.bind_address);
                    println!("  Sweep: every {}s, stale after {}s",
                        config.master.sweep_interval_secs,
                        config.master.stale_after_secs);
                }
                NodeRole::Slave => {
                    println!("  Master: {}", config.slave.master_address);
                    println!("  Heartbeat: {}s", config.slave.heartbeat_interval_secs);
                }
            }
            println!("  HTTP API: {}", config.api_address());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_template_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        for role in [NodeRole::Master, NodeRole::Slave] {
            let path = dir.path().join(format!("{}.toml", role));
            run_init(path.clone(), role).unwrap();
            let config = RelayConfig::from_file(&path).unwrap();
            assert_eq!(config.node.role, role);
            assert_eq!(config.master.bind_address, "0.0.0.0:8083");
            assert_eq!(config.slave.master_address, "localhost:8083");
        }
    }
}
