//! Quorum Calculation
//!
//! Weighted-majority arithmetic over the replica set. Every computation
//! works on a fresh membership snapshot; totals are never cached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::state::{MemberRegistry, MembershipSnapshot};

/// Strict weighted majority: exactly half is not enough
pub fn is_majority(tally: i64, total_votes: u64) -> bool {
    tally.saturating_mul(2) > total_votes as i64
}

/// Quorum calculator for one node
pub struct QuorumCalculator {
    registry: Arc<MemberRegistry>,
    /// Set once the even-total advisory has been logged
    warned_even: AtomicBool,
}

impl QuorumCalculator {
    /// Create a calculator over the given registry
    pub fn new(registry: Arc<MemberRegistry>) -> Self {
        Self {
            registry,
            warned_even: AtomicBool::new(false),
        }
    }

    /// Sum of every member's vote weight, regardless of liveness
    pub async fn total_votes(&self) -> u64 {
        let snapshot = self.registry.snapshot().await;
        self.total_votes_of(&snapshot)
    }

    /// Same as [`total_votes`](Self::total_votes) over an existing snapshot
    pub fn total_votes_of(&self, snapshot: &MembershipSnapshot) -> u64 {
        let total = snapshot.me.votes as u64
            + snapshot.peers.iter().map(|m| m.votes as u64).sum::<u64>();

        if total != 0 && total % 2 == 0 && !self.warned_even.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "Total number of votes is even ({}); consider giving one member an extra vote to avoid ties",
                total
            );
        }
        total
    }

    /// Whether members holding a majority of the votes look reachable.
    ///
    /// A liveness heuristic used to decide if an election is worth
    /// attempting, not an election decision.
    pub async fn a_majority_seems_to_be_up(&self) -> bool {
        let snapshot = self.registry.snapshot().await;
        let up = snapshot.me.votes as u64
            + snapshot.live_peers().map(|m| m.votes as u64).sum::<u64>();
        let total = self.total_votes_of(&snapshot);
        up.saturating_mul(2) > total
    }

    /// Whether the even-total advisory has already been emitted
    pub fn warned_even_total(&self) -> bool {
        self.warned_even.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Member;
    use std::time::Duration;

    fn calculator(self_votes: u32, peers: &[(u32, bool)]) -> QuorumCalculator {
        let peers = peers
            .iter()
            .enumerate()
            .map(|(i, (votes, up))| {
                let mut m = Member::new(format!("node-{}", i + 2), i as u32 + 2, "localhost:0", *votes);
                m.up = *up;
                m
            })
            .collect();
        let registry = MemberRegistry::new(
            Member::new("node-1", 1, "localhost:0", self_votes),
            peers,
            1,
            Duration::from_secs(1),
        );
        QuorumCalculator::new(Arc::new(registry))
    }

    #[test]
    fn test_is_majority_is_strict() {
        assert!(is_majority(3, 5));
        assert!(!is_majority(2, 4));
        assert!(is_majority(3, 4));
        assert!(!is_majority(0, 0));
        assert!(!is_majority(-9997, 5));
    }

    #[tokio::test]
    async fn test_total_votes_ignores_liveness() {
        let calc = calculator(1, &[(1, true), (2, false), (0, false)]);
        assert_eq!(calc.total_votes().await, 4);
    }

    #[tokio::test]
    async fn test_even_total_warns_once() {
        let calc = calculator(1, &[(1, true)]);
        assert!(!calc.warned_even_total());
        assert_eq!(calc.total_votes().await, 2);
        assert!(calc.warned_even_total());
        // Still reports the same total afterwards
        assert_eq!(calc.total_votes().await, 2);

        let odd = calculator(1, &[(1, true), (1, true)]);
        odd.total_votes().await;
        assert!(!odd.warned_even_total());
    }

    #[tokio::test]
    async fn test_majority_seems_up() {
        // 1 + 1 live of 5
        assert!(!calculator(1, &[(1, true), (1, false), (1, false), (1, false)])
            .a_majority_seems_to_be_up()
            .await);
        // 1 + 2 live of 5
        assert!(calculator(1, &[(1, true), (1, true), (1, false), (1, false)])
            .a_majority_seems_to_be_up()
            .await);
        // exactly half is not a majority
        assert!(!calculator(1, &[(1, true), (1, false), (1, false)])
            .a_majority_seems_to_be_up()
            .await);
        // a heavy live peer carries the majority
        assert!(calculator(1, &[(3, true), (1, false), (1, false)])
            .a_majority_seems_to_be_up()
            .await);
    }

    #[tokio::test]
    async fn test_single_node_set() {
        let calc = calculator(1, &[]);
        assert!(calc.a_majority_seems_to_be_up().await);
    }
}
