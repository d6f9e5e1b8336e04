//! Role State
//!
//! The local node's leadership role. Only the election coordinator may
//! promote the node; everyone else observes.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Role of a node in the replica set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Node is the replica set leader
    Leader,
    /// Node is a follower
    Follower,
    /// Node is canvassing for votes
    Candidate,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Leader => write!(f, "LEADER"),
            NodeRole::Follower => write!(f, "FOLLOWER"),
            NodeRole::Candidate => write!(f, "CANDIDATE"),
        }
    }
}

/// Current role of the local node
///
/// Backed by a `watch` channel so that write gates and the node runtime
/// can wait for a change instead of polling.
pub struct RoleState {
    tx: watch::Sender<NodeRole>,
}

impl RoleState {
    /// Start as a follower
    pub fn new() -> Self {
        let (tx, _) = watch::channel(NodeRole::Follower);
        Self { tx }
    }

    /// Get the current role
    pub fn current(&self) -> NodeRole {
        *self.tx.borrow()
    }

    /// Whether this node is currently the leader
    pub fn is_leader(&self) -> bool {
        self.current() == NodeRole::Leader
    }

    /// Subscribe to role changes
    pub fn subscribe(&self) -> watch::Receiver<NodeRole> {
        self.tx.subscribe()
    }

    /// Promote to leader; returns false if already leader
    pub(crate) fn promote_to_leader(&self) -> bool {
        self.tx.send_if_modified(|role| {
            if *role == NodeRole::Leader {
                return false;
            }
            *role = NodeRole::Leader;
            true
        })
    }
}

impl Default for RoleState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_promote_notifies_subscribers() {
        let role = RoleState::new();
        let mut rx = role.subscribe();
        assert_eq!(role.current(), NodeRole::Follower);

        assert!(role.promote_to_leader());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), NodeRole::Leader);

        // Second promotion is a no-op
        assert!(!role.promote_to_leader());
        assert!(role.is_leader());
    }
}
