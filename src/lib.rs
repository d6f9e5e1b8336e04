//! WolfVote - Replica Set Leader Election
//!
//! Weighted-majority leader election for a replicated node group. A member
//! that cannot see a leader canvasses every reachable peer for a vote and
//! becomes leader only when more than half of the configured vote weight
//! supports it.
//!
//! # Features
//!
//! - Weighted votes with strict-majority quorum
//! - Peer vetoes that override an otherwise passing tally
//! - Concurrent canvassing with a bounded collection deadline
//! - At most one election attempt in flight per node
//! - Heartbeat-driven liveness tracking
//! - Framed TCP protocol for heartbeats, votes and status

pub mod config;
pub mod error;
pub mod state;
pub mod network;
pub mod node;

pub use config::WolfVoteConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfVoteConfig;
    pub use crate::error::{Error, Result};
    pub use crate::state::{
        ElectionCoordinator, ElectionOutcome, MemberRegistry, NodeRole, QuorumCalculator,
        RoleState,
    };
    pub use crate::network::Message;
    pub use crate::node::ReplicaNode;
}
