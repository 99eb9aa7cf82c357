//! RelayCtl - Command line tool for RelayDB nodes
//!
//! Usage:
//!   relayctl query "<sql>"   - Run a query through a node's HTTP API
//!   relayctl slaves          - List slaves registered with the master
//!   relayctl replicate ...   - Apply a replicated change on a node
//!   relayctl health          - Show node health

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

use relaydb::api::{HealthResponse, QueryRequest};
use relaydb::config::RelayConfig;
use relaydb::network::Response;
use relaydb::replication::ReplicationOp;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8082";

/// RelayDB Control Tool
#[derive(Parser)]
#[command(name = "relayctl")]
#[command(about = "Query and inspect RelayDB nodes", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "relaydb.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SQL statement
    Query {
        /// Statement text
        sql: String,
        /// Declared caller role (slave callers may only read)
        #[arg(long)]
        role: Option<String>,
    },
    /// List registered slaves (master only)
    Slaves,
    /// Apply a replicated row change
    Replicate {
        #[arg(long)]
        db: String,
        #[arg(long)]
        table: String,
        /// INSERT, UPDATE or DELETE
        #[arg(long)]
        operation: String,
        /// VALUES list, SET clause or WHERE clause
        #[arg(long)]
        data: String,
    },
    /// Show node health
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let endpoint = resolve_endpoint(&cli);

    let result = match &cli.command {
        Commands::Query { sql, role } => run_query(&endpoint, sql, role.clone()).await,
        Commands::Slaves => list_slaves(&endpoint).await,
        Commands::Replicate { db, table, operation, data } => {
            replicate(&endpoint, ReplicationOp::new(db, table, operation, data)).await
        }
        Commands::Health => show_health(&endpoint).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Explicit endpoint, else the config's API address, else the master default
fn resolve_endpoint(cli: &Cli) -> String {
    if let Some(e) = &cli.endpoint {
        return e.trim_end_matches('/').to_string();
    }
    if !cli.config.exists() {
        return DEFAULT_ENDPOINT.to_string();
    }
    match RelayConfig::from_file(&cli.config) {
        Ok(config) => endpoint_for(&config.api_address()),
        Err(_) => DEFAULT_ENDPOINT.to_string(),
    }
}

fn endpoint_for(bind_address: &str) -> String {
    match bind_address.strip_prefix("0.0.0.0:") {
        Some(port) => format!("http://127.0.0.1:{}", port),
        None => format!("http://{}", bind_address),
    }
}

// ============ Commands ============

async fn run_query(
    endpoint: &str,
    sql: &str,
    role: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/api/query", endpoint);
    let client = reqwest::Client::new();

    let response = client
        .post(&url)
        .json(&QueryRequest { query: sql.to_string(), role })
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(format!("API error: {} {}", status, text.trim()).into());
    }

    let result: Response = response.json().await?;
    if !result.is_ok() {
        return Err(result.message.into());
    }

    println!("{}", result.message);
    if let (Some(header), Some(rows)) = (&result.header, &result.rows) {
        println!();
        println!("{}", header.iter().map(|c| format!("{:<20}", c)).collect::<String>());
        println!("{}", "-".repeat(20 * header.len()));
        for row in rows {
            let line: String = row
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => format!("{:<20}", s),
                    serde_json::Value::Null => format!("{:<20}", "NULL"),
                    other => format!("{:<20}", other),
                })
                .collect();
            println!("{}", line);
        }
        println!();
        println!("({} rows)", rows.len());
    }

    Ok(())
}

async fn list_slaves(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/api/slaves", endpoint);
    let client = reqwest::Client::new();

    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }

    let slaves: BTreeMap<String, String> = response.json().await?;

    println!();
    println!("Registered Slaves ({})", slaves.len());
    println!("=====================");
    println!();
    println!("{:<25} {:<35}", "IDENTITY", "LAST SEEN");
    println!("{}", "-".repeat(60));
    for (identity, last_seen) in &slaves {
        println!("{:<25} {:<35}", identity, last_seen);
    }
    println!();

    Ok(())
}

async fn replicate(endpoint: &str, op: ReplicationOp) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/api/replicate", endpoint);
    let client = reqwest::Client::new();

    let response = client.post(&url).json(&op).send().await?;
    let result: Response = response.json().await?;

    if !result.is_ok() {
        return Err(result.message.into());
    }
    println!("✓ {}", result.message);
    Ok(())
}

async fn show_health(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/health", endpoint);
    let client = reqwest::Client::new();

    let response = client.get(&url).send().await?;
    let health: HealthResponse = response.json().await?;

    println!();
    println!("Node Health");
    println!("===========");
    println!();
    println!("Role:         {}", health.role);
    println!("Database:     {}", if health.database { "reachable" } else { "UNREACHABLE" });
    if let Some(connected) = health.connected_to_master {
        println!("Master link:  {}", if connected { "connected" } else { "disconnected" });
    }
    println!("Healthy:      {}", health.healthy);
    println!();

    if !health.healthy {
        return Err("node is unhealthy".into());
    }
    Ok(())
}
