//! Replica Set Membership
//!
//! Tracks the configured members, their vote weights and liveness.
//! Liveness is driven by heartbeats; the election code only reads it.

use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{PeerConfig, WolfVoteConfig};
use crate::error::{Error, Result};
use crate::state::NodeRole;

/// A single member of the replica set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Unique node identifier
    pub id: String,
    /// Numeric member id from the set configuration
    pub member_id: u32,
    /// Node address (host:port)
    pub address: String,
    /// Configured vote weight
    pub votes: u32,
    /// Whether the member is currently reachable
    pub up: bool,
    /// Role the member last reported in a heartbeat
    pub reported_role: NodeRole,
    /// Last heartbeat time (not serialized)
    #[serde(skip)]
    pub last_heartbeat: Option<Instant>,
}

impl Member {
    /// Create a member that has not been heard from yet
    pub fn new(id: impl Into<String>, member_id: u32, address: impl Into<String>, votes: u32) -> Self {
        Self {
            id: id.into(),
            member_id,
            address: address.into(),
            votes,
            up: false,
            reported_role: NodeRole::Follower,
            last_heartbeat: None,
        }
    }

    /// Mark the member as up, e.g. in tests or static setups
    pub fn live(mut self) -> Self {
        self.up = true;
        self
    }

    /// Time since last heartbeat
    pub fn time_since_heartbeat(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }

    /// Whether the member is up and claims to be leader
    pub fn is_live_primary(&self) -> bool {
        self.up && self.reported_role == NodeRole::Leader
    }
}

impl From<&PeerConfig> for Member {
    fn from(peer: &PeerConfig) -> Self {
        Member::new(peer.id.clone(), peer.member_id, peer.address.clone(), peer.votes)
    }
}

/// Point-in-time copy of the membership used by one computation
#[derive(Debug, Clone)]
pub struct MembershipSnapshot {
    /// This node
    pub me: Member,
    /// Peers, in configuration order
    pub peers: Vec<Member>,
    /// Configuration generation
    pub config_version: u64,
}

impl MembershipSnapshot {
    /// Peers currently marked up
    pub fn live_peers(&self) -> impl Iterator<Item = &Member> {
        self.peers.iter().filter(|m| m.up)
    }
}

/// Replica set membership tracker
pub struct MemberRegistry {
    /// This node (always considered up)
    me: Member,
    /// Peers in configuration order
    peers: RwLock<Vec<Member>>,
    /// Configuration generation
    config_version: u64,
    /// Heartbeat timeout
    heartbeat_timeout: Duration,
}

impl MemberRegistry {
    /// Create a new membership tracker
    pub fn new(me: Member, peers: Vec<Member>, config_version: u64, heartbeat_timeout: Duration) -> Self {
        Self {
            me: me.live(),
            peers: RwLock::new(peers),
            config_version,
            heartbeat_timeout,
        }
    }

    /// Build the registry from configuration
    pub fn from_config(config: &WolfVoteConfig) -> Self {
        let me = Member::new(
            config.node.id.clone(),
            config.node.member_id,
            config.advertise_address().to_string(),
            config.node.votes,
        );
        let peers = config.cluster.peers.iter().map(Member::from).collect();

        Self::new(me, peers, config.cluster.config_version, config.heartbeat_timeout())
    }

    /// Get this node's descriptor
    pub fn me(&self) -> &Member {
        &self.me
    }

    /// Get this node's ID
    pub fn node_id(&self) -> &str {
        &self.me.id
    }

    /// Configuration generation
    pub fn config_version(&self) -> u64 {
        self.config_version
    }

    /// Take a consistent copy of the membership
    pub async fn snapshot(&self) -> MembershipSnapshot {
        MembershipSnapshot {
            me: self.me.clone(),
            peers: self.peers.read().await.clone(),
            config_version: self.config_version,
        }
    }

    /// All peers, in configuration order
    pub async fn peers(&self) -> Vec<Member> {
        self.peers.read().await.clone()
    }

    /// Look up a peer by node id
    pub async fn get_peer(&self, id: &str) -> Option<Member> {
        let peers = self.peers.read().await;
        peers.iter().find(|m| m.id == id).cloned()
    }

    /// Look up any member (self included) by numeric member id
    pub async fn find_by_member_id(&self, member_id: u32) -> Option<Member> {
        if self.me.member_id == member_id {
            return Some(self.me.clone());
        }
        let peers = self.peers.read().await;
        peers.iter().find(|m| m.member_id == member_id).cloned()
    }

    /// Record a heartbeat (or heartbeat response) from a peer
    pub async fn record_heartbeat(&self, id: &str, role: NodeRole) -> Result<()> {
        let mut peers = self.peers.write().await;
        let member = peers
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))?;

        if !member.up {
            tracing::info!("Member {} is up", id);
        }
        member.up = true;
        member.reported_role = role;
        member.last_heartbeat = Some(Instant::now());
        Ok(())
    }

    /// Force a peer's liveness flag
    pub async fn set_liveness(&self, id: &str, up: bool) -> Result<()> {
        let mut peers = self.peers.write().await;
        let member = peers
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))?;
        member.up = up;
        Ok(())
    }

    /// Mark peers whose heartbeats have gone quiet as down.
    /// Returns the ids that changed state.
    pub async fn check_timeouts(&self) -> Vec<String> {
        let mut peers = self.peers.write().await;
        let mut timed_out = Vec::new();

        for member in peers.iter_mut().filter(|m| m.up) {
            let expired = match member.time_since_heartbeat() {
                Some(since) => since > self.heartbeat_timeout,
                None => true,
            };
            if expired {
                member.up = false;
                // A silent leader is no longer a leader we can defer to
                member.reported_role = NodeRole::Follower;
                timed_out.push(member.id.clone());
            }
        }

        for id in &timed_out {
            tracing::warn!("Member {} missed heartbeats, marking down", id);
        }
        timed_out
    }

    /// A live peer currently reporting itself as leader
    pub async fn known_primary(&self) -> Option<Member> {
        let peers = self.peers.read().await;
        peers.iter().find(|m| m.is_live_primary()).cloned()
    }

    /// Get membership summary
    pub async fn summary(&self) -> MembershipSummary {
        let peers = self.peers.read().await;
        let live: Vec<&Member> = peers.iter().filter(|m| m.up).collect();

        MembershipSummary {
            total_members: peers.len() + 1,
            live_members: live.len() + 1,
            total_votes: self.me.votes as u64 + peers.iter().map(|m| m.votes as u64).sum::<u64>(),
            live_votes: self.me.votes as u64 + live.iter().map(|m| m.votes as u64).sum::<u64>(),
            primary_id: live
                .iter()
                .find(|m| m.reported_role == NodeRole::Leader)
                .map(|m| m.id.clone()),
        }
    }
}

/// Membership summary information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipSummary {
    pub total_members: usize,
    pub live_members: usize,
    pub total_votes: u64,
    pub live_votes: u64,
    pub primary_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(timeout: Duration) -> MemberRegistry {
        MemberRegistry::new(
            Member::new("node-1", 1, "localhost:7654", 1),
            vec![
                Member::new("node-2", 2, "localhost:7655", 1),
                Member::new("node-3", 3, "localhost:7656", 2),
            ],
            7,
            timeout,
        )
    }

    #[tokio::test]
    async fn test_snapshot_keeps_config_order() {
        let registry = registry(Duration::from_secs(1));
        let snapshot = registry.snapshot().await;

        assert!(snapshot.me.up);
        assert_eq!(snapshot.config_version, 7);
        let ids: Vec<_> = snapshot.peers.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["node-2", "node-3"]);
        assert_eq!(snapshot.live_peers().count(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_and_timeout() {
        let registry = registry(Duration::from_millis(100));

        registry.record_heartbeat("node-2", NodeRole::Leader).await.unwrap();
        assert_eq!(registry.known_primary().await.unwrap().id, "node-2");

        let summary = registry.summary().await;
        assert_eq!(summary.live_members, 2);
        assert_eq!(summary.total_votes, 4);
        assert_eq!(summary.live_votes, 2);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let timed_out = registry.check_timeouts().await;
        assert_eq!(timed_out, vec!["node-2".to_string()]);
        assert!(registry.known_primary().await.is_none());
        assert!(!registry.get_peer("node-2").await.unwrap().up);
    }

    #[tokio::test]
    async fn test_unknown_peer_heartbeat() {
        let registry = registry(Duration::from_secs(1));
        let err = registry.record_heartbeat("node-9", NodeRole::Follower).await;
        assert!(matches!(err, Err(Error::NodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_find_by_member_id() {
        let registry = registry(Duration::from_secs(1));
        assert_eq!(registry.find_by_member_id(1).await.unwrap().id, "node-1");
        assert_eq!(registry.find_by_member_id(3).await.unwrap().votes, 2);
        assert!(registry.find_by_member_id(4).await.is_none());
    }
}
