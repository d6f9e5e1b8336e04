//! Vote Canvassing
//!
//! Asks a single peer for its vote. Every failure mode (refused
//! connection, timeout, protocol error) is folded into
//! [`VoteResult::Absent`] so the tally never sees an error.

use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::Member;

/// Vote value a peer returns to reject a candidacy outright
pub const VETO: i32 = -10000;

/// Request sent to every canvassed peer during one election attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionRequest {
    /// Replica set name
    pub set_name: String,
    /// Candidate's advertised address
    pub candidate_address: String,
    /// Candidate's member id
    pub candidate_member_id: u32,
    /// Candidate's configuration generation
    pub config_version: u64,
}

/// Outcome of canvassing one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteResult {
    /// The peer answered; positive supports, negative vetoes, zero abstains
    Vote(i32),
    /// The peer did not participate (unreachable, timed out, errored)
    Absent,
}

impl VoteResult {
    /// Contribution to the tally
    pub fn value(&self) -> i64 {
        match self {
            VoteResult::Vote(v) => *v as i64,
            VoteResult::Absent => 0,
        }
    }
}

/// Remote call primitive used to request a vote from a peer
#[async_trait::async_trait]
pub trait VoteTransport: Send + Sync {
    /// Send the request and return the peer's vote value
    async fn request_vote(&self, peer: &Member, request: &ElectionRequest) -> Result<i32>;
}

/// Issues bounded vote requests to individual peers
#[derive(Clone)]
pub struct VoteCanvasser {
    transport: Arc<dyn VoteTransport>,
    /// Per-call timeout
    timeout: Duration,
}

impl VoteCanvasser {
    /// Create a canvasser over the given transport
    pub fn new(transport: Arc<dyn VoteTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Ask one peer for its vote
    pub async fn canvass(&self, peer: &Member, request: &ElectionRequest) -> VoteResult {
        match tokio::time::timeout(self.timeout, self.transport.request_vote(peer, request)).await {
            Ok(Ok(vote)) => {
                tracing::debug!("Vote from {} ({}): {}", peer.id, peer.address, vote);
                VoteResult::Vote(vote)
            }
            Ok(Err(e)) => {
                tracing::debug!("No vote from {} ({}): {}", peer.id, peer.address, e);
                VoteResult::Absent
            }
            Err(_) => {
                tracing::debug!(
                    "Vote request to {} ({}) timed out after {:?}",
                    peer.id,
                    peer.address,
                    self.timeout
                );
                VoteResult::Absent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FixedTransport(Option<i32>, Duration);

    #[async_trait::async_trait]
    impl VoteTransport for FixedTransport {
        async fn request_vote(&self, peer: &Member, _request: &ElectionRequest) -> Result<i32> {
            tokio::time::sleep(self.1).await;
            self.0.ok_or_else(|| Error::ConnectionFailed {
                address: peer.address.clone(),
                reason: "connection refused".into(),
            })
        }
    }

    fn request() -> ElectionRequest {
        ElectionRequest {
            set_name: "rs0".into(),
            candidate_address: "localhost:7654".into(),
            candidate_member_id: 1,
            config_version: 1,
        }
    }

    fn canvasser(vote: Option<i32>, delay: Duration) -> VoteCanvasser {
        VoteCanvasser::new(Arc::new(FixedTransport(vote, delay)), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_vote_is_reported() {
        let peer = Member::new("node-2", 2, "localhost:7655", 1);
        let result = canvasser(Some(1), Duration::ZERO).canvass(&peer, &request()).await;
        assert_eq!(result, VoteResult::Vote(1));
        assert_eq!(result.value(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_absent() {
        let peer = Member::new("node-2", 2, "localhost:7655", 1);
        let result = canvasser(None, Duration::ZERO).canvass(&peer, &request()).await;
        assert_eq!(result, VoteResult::Absent);
        assert_eq!(result.value(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_absent() {
        let peer = Member::new("node-2", 2, "localhost:7655", 1);
        let result = canvasser(Some(1), Duration::from_secs(5)).canvass(&peer, &request()).await;
        assert_eq!(result, VoteResult::Absent);
    }
}
