//! Vote Responder
//!
//! The peer side of an election: decides what this node answers when
//! another member asks for its vote.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::state::{ElectionRequest, MemberRegistry, RoleState, VETO};

/// A vote granted to a candidate, held in memory only
#[derive(Debug, Clone, Copy)]
struct VoteLease {
    candidate_member_id: u32,
    granted_at: Instant,
}

/// This node's vote, shared by its own candidacy and the responder.
///
/// A node standing for election leases its vote to itself first, so a
/// vote is never counted for two candidates within one lease.
#[derive(Debug)]
pub struct VoteLedger {
    /// How long a granted vote blocks other candidates
    lease_duration: Duration,
    lease: Mutex<Option<VoteLease>>,
}

impl VoteLedger {
    pub fn new(lease_duration: Duration) -> Self {
        Self {
            lease_duration,
            lease: Mutex::new(None),
        }
    }

    /// Lease the vote to `member_id` unless another member holds an
    /// unexpired lease. Returns the current holder on refusal.
    pub fn try_grant(&self, member_id: u32) -> std::result::Result<(), u32> {
        let mut lease = self.lease.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(held) = *lease {
            if held.candidate_member_id != member_id
                && held.granted_at.elapsed() < self.lease_duration
            {
                return Err(held.candidate_member_id);
            }
        }
        *lease = Some(VoteLease {
            candidate_member_id: member_id,
            granted_at: Instant::now(),
        });
        Ok(())
    }

    /// Drop the lease if `member_id` still holds it
    pub fn release(&self, member_id: u32) {
        let mut lease = self.lease.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*lease, Some(held) if held.candidate_member_id == member_id) {
            *lease = None;
        }
    }

    /// Member holding an unexpired lease, if any
    pub fn holder(&self) -> Option<u32> {
        let lease = self.lease.lock().unwrap_or_else(PoisonError::into_inner);
        lease
            .filter(|held| held.granted_at.elapsed() < self.lease_duration)
            .map(|held| held.candidate_member_id)
    }
}

/// Answers vote requests from candidates
pub struct VoteResponder {
    set_name: String,
    registry: Arc<MemberRegistry>,
    role: Arc<RoleState>,
    ledger: Arc<VoteLedger>,
}

impl VoteResponder {
    /// Create a responder for this node
    pub fn new(
        set_name: String,
        registry: Arc<MemberRegistry>,
        role: Arc<RoleState>,
        ledger: Arc<VoteLedger>,
    ) -> Self {
        Self {
            set_name,
            registry,
            role,
            ledger,
        }
    }

    /// Decide the vote for `request`.
    ///
    /// A request for a different replica set is a protocol error, which
    /// the candidate counts as no participation.
    pub async fn respond(&self, request: &ElectionRequest) -> Result<i32> {
        if request.set_name != self.set_name {
            return Err(Error::Protocol(format!(
                "wrong replica set name: expected {}, got {}",
                self.set_name, request.set_name
            )));
        }

        let me = self.registry.me();
        let candidate = match self.registry.find_by_member_id(request.candidate_member_id).await {
            Some(m) if m.member_id != me.member_id => m,
            _ => {
                tracing::warn!(
                    "Vetoing unknown candidate {} (member id {})",
                    request.candidate_address,
                    request.candidate_member_id
                );
                return Ok(VETO);
            }
        };

        let our_version = self.registry.config_version();
        if request.config_version < our_version {
            tracing::info!(
                "Vetoing {}: config version {} is older than ours ({})",
                candidate.id,
                request.config_version,
                our_version
            );
            return Ok(VETO);
        }
        if request.config_version > our_version {
            tracing::info!(
                "Abstaining on {}: our config version {} is stale (candidate has {})",
                candidate.id,
                our_version,
                request.config_version
            );
            return Ok(0);
        }

        if self.role.is_leader() {
            tracing::info!("Vetoing {}: this node is already leader", candidate.id);
            return Ok(VETO);
        }

        if let Some(primary) = self.registry.known_primary().await {
            if primary.member_id != candidate.member_id {
                tracing::info!("Vetoing {}: {} is already leader", candidate.id, primary.id);
                return Ok(VETO);
            }
        }

        if let Err(holder) = self.ledger.try_grant(candidate.member_id) {
            tracing::info!(
                "Abstaining on {}: vote already granted to member {}",
                candidate.id,
                holder
            );
            return Ok(0);
        }

        tracing::info!("Voting for {} with {} vote(s)", candidate.id, me.votes);
        Ok(i32::try_from(me.votes).unwrap_or(i32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Member, NodeRole};

    fn responder(lease: Duration) -> (VoteResponder, Arc<MemberRegistry>, Arc<RoleState>) {
        responder_with(2, Arc::new(VoteLedger::new(lease)))
    }

    fn responder_with(
        votes: u32,
        ledger: Arc<VoteLedger>,
    ) -> (VoteResponder, Arc<MemberRegistry>, Arc<RoleState>) {
        let registry = Arc::new(MemberRegistry::new(
            Member::new("node-2", 2, "localhost:7655", votes),
            vec![
                Member::new("node-1", 1, "localhost:7654", 1),
                Member::new("node-3", 3, "localhost:7656", 1),
            ],
            5,
            Duration::from_secs(10),
        ));
        let role = Arc::new(RoleState::new());
        let responder = VoteResponder::new(
            "rs0".to_string(),
            Arc::clone(&registry),
            Arc::clone(&role),
            ledger,
        );
        (responder, registry, role)
    }

    fn request(member_id: u32, config_version: u64) -> ElectionRequest {
        ElectionRequest {
            set_name: "rs0".into(),
            candidate_address: format!("localhost:765{}", 3 + member_id),
            candidate_member_id: member_id,
            config_version,
        }
    }

    #[tokio::test]
    async fn test_grants_own_weight() {
        let (responder, _, _) = responder(Duration::from_secs(30));
        assert_eq!(responder.respond(&request(1, 5)).await.unwrap(), 2);
        // Same candidate may ask again
        assert_eq!(responder.respond(&request(1, 5)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_wrong_set_name_is_error() {
        let (responder, _, _) = responder(Duration::from_secs(30));
        let mut req = request(1, 5);
        req.set_name = "rs1".into();
        assert!(matches!(responder.respond(&req).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_unknown_candidate_vetoed() {
        let (responder, _, _) = responder(Duration::from_secs(30));
        assert_eq!(responder.respond(&request(9, 5)).await.unwrap(), VETO);
        // Our own member id is not a valid candidate either
        assert_eq!(responder.respond(&request(2, 5)).await.unwrap(), VETO);
    }

    #[tokio::test]
    async fn test_config_version_rules() {
        let (responder, _, _) = responder(Duration::from_secs(30));
        assert_eq!(responder.respond(&request(1, 4)).await.unwrap(), VETO);
        assert_eq!(responder.respond(&request(1, 6)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_known_primary_vetoes_others() {
        let (responder, registry, _) = responder(Duration::from_secs(30));
        registry.record_heartbeat("node-3", NodeRole::Leader).await.unwrap();
        assert_eq!(responder.respond(&request(1, 5)).await.unwrap(), VETO);
        // The reported leader itself may be re-confirmed
        assert_eq!(responder.respond(&request(3, 5)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_leader_vetoes() {
        let (responder, _, role) = responder(Duration::from_secs(30));
        role.promote_to_leader();
        assert_eq!(responder.respond(&request(1, 5)).await.unwrap(), VETO);
    }

    #[tokio::test]
    async fn test_vote_lease() {
        let (responder, _, _) = responder(Duration::from_millis(50));
        assert_eq!(responder.respond(&request(1, 5)).await.unwrap(), 2);
        assert_eq!(responder.respond(&request(3, 5)).await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(responder.respond(&request(3, 5)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_own_candidacy_blocks_vote() {
        let ledger = Arc::new(VoteLedger::new(Duration::from_secs(30)));
        let (responder, _, _) = responder_with(2, Arc::clone(&ledger));

        // node-2 is standing itself
        ledger.try_grant(2).unwrap();
        assert_eq!(responder.respond(&request(1, 5)).await.unwrap(), 0);

        ledger.release(2);
        assert_eq!(responder.respond(&request(1, 5)).await.unwrap(), 2);
        assert_eq!(ledger.holder(), Some(1));
        // Releasing someone else's lease is a no-op
        ledger.release(2);
        assert_eq!(ledger.try_grant(2), Err(1));
    }

    #[tokio::test]
    async fn test_oversized_weight_is_clamped() {
        let ledger = Arc::new(VoteLedger::new(Duration::from_secs(30)));
        let (responder, _, _) = responder_with(u32::MAX, ledger);
        assert_eq!(responder.respond(&request(1, 5)).await.unwrap(), i32::MAX);
    }
}
