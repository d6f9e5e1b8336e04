//! WolfVote - Replica Set Leader Election
//!
//! Runs a replica set member that elects itself leader when a weighted
//! majority of the set agrees.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfvote::config::WolfVoteConfig;
use wolfvote::error::{Error, Result};
use wolfvote::network::{Message, NetworkClient};
use wolfvote::node::ReplicaNode;

/// WolfVote - Replica Set Leader Election
#[derive(Parser)]
#[command(name = "wolfvote")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfvote.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the replica set member
    Start,

    /// Query a running node's status
    Status {
        /// Node address to query (host:port)
        #[arg(short, long, default_value = "localhost:7654")]
        address: String,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfvote.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value = "node-1")]
        node_id: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it is readable
    let logging = WolfVoteConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(logging.level);
    init_logging(&level, &logging.format);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Status { address } => run_status(address).await,
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
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

/// Start the replica set member
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting WolfVote node...");

    let config = match WolfVoteConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    tracing::info!("Loaded configuration for node: {}", config.node.id);

    let node = Arc::new(ReplicaNode::new(config));
    let handle = Arc::clone(&node).start().await?;
    tracing::info!("Node listening on {}", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C");
    handle.shutdown().await;

    Ok(())
}

/// Query a running node
async fn run_status(address: String) -> Result<()> {
    let client = NetworkClient::new(Duration::from_secs(2), Duration::from_secs(5));

    match client.send(&address, Message::StatusRequest).await? {
        Message::StatusResponse(report) => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| Error::Internal(format!("failed to render status: {}", e)))?;
            println!("{}", json);
            Ok(())
        }
        Message::Error { code, message } => {
            Err(Error::Protocol(format!("{:?}: {}", code, message)))
        }
        other => Err(Error::UnexpectedResponse {
            address,
            message_type: other.type_name(),
        }),
    }
}

/// Write a sample configuration file
fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    if output.exists() {
        return Err(Error::Config(format!("{:?} already exists", output)));
    }

    std::fs::write(&output, WolfVoteConfig::sample(&node_id))?;
    println!("Configuration written to {:?}", output);
    println!("Edit the peer list and set_name, then run: wolfvote --config {:?} start", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    let config = WolfVoteConfig::from_file(&config_path)?;
    println!("Configuration is valid");
    println!("  Node: {} (member {})", config.node.id, config.node.member_id);
    println!("  Replica set: {}", config.cluster.set_name);
    println!("  Peers: {}", config.cluster.peers.len());

    let total = config.configured_votes();
    if total != 0 && total % 2 == 0 {
        println!("  Warning: total number of votes is even ({}); consider an odd total", total);
    }
    Ok(())
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfVoteConfig::from_file(&config_path)?;

    println!("WolfVote Node Information");
    println!("=========================");
    println!("Node ID:            {}", config.node.id);
    println!("Member ID:          {}", config.node.member_id);
    println!("Bind Address:       {}", config.node.bind_address);
    println!("Advertise Address:  {}", config.advertise_address());
    println!("Votes:              {}", config.node.votes);
    println!("Replica Set:        {}", config.cluster.set_name);
    println!("Config Version:     {}", config.cluster.config_version);
    println!("Total Votes:        {}", config.configured_votes());
    println!("Auto Election:      {}", !config.cluster.disable_auto_election);
    println!();
    println!("Peers:");
    for peer in &config.cluster.peers {
        println!("  {:<16} member {:<4} votes {:<3} {}", peer.id, peer.member_id, peer.votes, peer.address);
    }
    Ok(())
}
