//! WolfVote Configuration
//!
//! This module provides configuration structures for a replica set
//! member: its own identity and vote weight, the peers it canvasses,
//! and the timing knobs for heartbeats and elections.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main WolfVote configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfVoteConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Replica set configuration
    pub cluster: ClusterConfig,

    /// Election timing configuration
    #[serde(default)]
    pub election: ElectionSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    pub id: String,

    /// Numeric member id within the replica set configuration
    pub member_id: u32,

    /// Address to bind for cluster communication
    pub bind_address: String,

    /// Advertised address for other nodes to connect
    #[serde(default)]
    pub advertise_address: Option<String>,

    /// Vote weight of this node
    #[serde(default = "default_votes")]
    pub votes: u32,
}

/// A configured peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerConfig {
    /// Peer node identifier
    pub id: String,

    /// Numeric member id
    pub member_id: u32,

    /// Peer address (host:port)
    pub address: String,

    /// Vote weight of the peer
    #[serde(default = "default_votes")]
    pub votes: u32,
}

/// Replica set configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Replica set name, must match on every member
    pub set_name: String,

    /// Configuration generation; bump whenever membership or weights change
    #[serde(default = "default_config_version")]
    pub config_version: u64,

    /// Other members of the set
    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    /// Heartbeat interval in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// A peer silent for this long is considered down (0 = 3x interval)
    #[serde(default)]
    pub heartbeat_timeout_ms: u64,

    /// How often the node checks whether it should stand for election
    #[serde(default = "default_election_check_interval_ms")]
    pub election_check_interval_ms: u64,

    /// Maximum random delay added to each election check
    #[serde(default = "default_election_jitter_ms")]
    pub election_jitter_ms: u64,

    /// Disable automatic elections (the node still answers vote requests)
    #[serde(default)]
    pub disable_auto_election: bool,
}

/// Election timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSettings {
    /// Timeout for a single vote request, in milliseconds
    #[serde(default = "default_vote_timeout_ms")]
    pub vote_timeout_ms: u64,

    /// TCP connect timeout, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// How long the coordinator waits for canvass results, in seconds
    #[serde(default = "default_collect_deadline_secs")]
    pub collect_deadline_secs: u64,

    /// Elapsed time after which a winning tally is flagged as possibly stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// How long a granted vote blocks voting for a different candidate
    #[serde(default = "default_vote_lease_secs")]
    pub vote_lease_secs: u64,
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
fn default_votes() -> u32 {
    1
}

fn default_config_version() -> u64 {
    1
}

fn default_heartbeat_interval_ms() -> u64 {
    500
}

fn default_election_check_interval_ms() -> u64 {
    1000
}

fn default_election_jitter_ms() -> u64 {
    500
}

fn default_vote_timeout_ms() -> u64 {
    4000
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_collect_deadline_secs() -> u64 {
    5
}

fn default_stale_after_secs() -> u64 {
    30
}

fn default_vote_lease_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self {
            vote_timeout_ms: default_vote_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            collect_deadline_secs: default_collect_deadline_secs(),
            stale_after_secs: default_stale_after_secs(),
            vote_lease_secs: default_vote_lease_secs(),
        }
    }
}

impl ElectionSettings {
    /// Per-call vote request timeout
    pub fn vote_timeout(&self) -> Duration {
        Duration::from_millis(self.vote_timeout_ms)
    }

    /// TCP connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Bounded wait for canvass results
    pub fn collect_deadline(&self) -> Duration {
        Duration::from_secs(self.collect_deadline_secs)
    }

    /// Stale-result diagnostic threshold
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Vote lease held by a responder
    pub fn vote_lease(&self) -> Duration {
        Duration::from_secs(self.vote_lease_secs)
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

impl WolfVoteConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfVoteConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.cluster.set_name.is_empty() {
            return Err(crate::Error::Config("cluster.set_name cannot be empty".into()));
        }

        if self.cluster.heartbeat_interval_ms == 0 {
            return Err(crate::Error::Config(
                "cluster.heartbeat_interval_ms must be greater than zero".into(),
            ));
        }

        if self.election.vote_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "election.vote_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.election.collect_deadline_secs == 0 {
            return Err(crate::Error::Config(
                "election.collect_deadline_secs must be greater than zero".into(),
            ));
        }

        let mut ids = HashSet::new();
        let mut member_ids = HashSet::new();
        ids.insert(self.node.id.as_str());
        member_ids.insert(self.node.member_id);

        for peer in &self.cluster.peers {
            if peer.address.is_empty() {
                return Err(crate::Error::Config(format!(
                    "peer {} has an empty address",
                    peer.id
                )));
            }
            if !ids.insert(peer.id.as_str()) {
                return Err(crate::Error::Config(format!(
                    "duplicate node id in replica set: {}",
                    peer.id
                )));
            }
            if !member_ids.insert(peer.member_id) {
                return Err(crate::Error::Config(format!(
                    "duplicate member_id in replica set: {}",
                    peer.member_id
                )));
            }
        }

        Ok(())
    }

    /// Get the advertised address (or bind address if not set)
    pub fn advertise_address(&self) -> &str {
        self.node
            .advertise_address
            .as_deref()
            .unwrap_or(&self.node.bind_address)
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.cluster.heartbeat_interval_ms)
    }

    /// Get heartbeat timeout as Duration
    pub fn heartbeat_timeout(&self) -> Duration {
        if self.cluster.heartbeat_timeout_ms > 0 {
            Duration::from_millis(self.cluster.heartbeat_timeout_ms)
        } else {
            self.heartbeat_interval() * 3
        }
    }

    /// Get election check interval as Duration
    pub fn election_check_interval(&self) -> Duration {
        Duration::from_millis(self.cluster.election_check_interval_ms)
    }

    /// Total configured vote weight (self plus every peer)
    pub fn configured_votes(&self) -> u64 {
        self.node.votes as u64 + self.cluster.peers.iter().map(|p| p.votes as u64).sum::<u64>()
    }

    /// Sample configuration written by `wolfvote init`
    pub fn sample(node_id: &str) -> String {
        format!(
            r#"# WolfVote configuration

[node]
id = "{node_id}"
member_id = 1
bind_address = "0.0.0.0:7654"
# advertise_address = "10.0.0.1:7654"
votes = 1

[cluster]
set_name = "rs0"
config_version = 1
heartbeat_interval_ms = 500
election_check_interval_ms = 1000
election_jitter_ms = 500
disable_auto_election = false

[[cluster.peers]]
id = "node-2"
member_id = 2
address = "10.0.0.2:7654"
votes = 1

[[cluster.peers]]
id = "node-3"
member_id = 3
address = "10.0.0.3:7654"
votes = 1

[election]
vote_timeout_ms = 4000
connect_timeout_ms = 1000
collect_deadline_secs = 5
stale_after_secs = 30
vote_lease_secs = 30

[logging]
level = "info"
format = "pretty"
"#
        )
    }
}
