//! Leader Election
//!
//! A node that believes the leader is unreachable stands for election by
//! canvassing every live peer concurrently and tallying their weighted
//! votes. At most one attempt runs per node at a time.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::config::ElectionSettings;
use crate::error::{Error, Result};
use crate::state::quorum::is_majority;
use crate::state::{
    ElectionRequest, Member, MemberRegistry, NodeRole, QuorumCalculator, RoleState,
    VoteCanvasser, VoteLedger, VoteResult,
};

/// Result of calling [`ElectionCoordinator::elect_self`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Another attempt was already running; nothing was done
    AlreadyInProgress,
    /// Majority reached, the node is now leader
    Elected { tally: i64, total_votes: u64 },
    /// Majority not reached, role unchanged
    NotElected { tally: i64, total_votes: u64 },
    /// This node's vote is leased to another candidate; nothing was done
    VoteLeased { holder: u32 },
    /// The attempt hit an internal error, role unchanged
    Failed,
}

impl ElectionOutcome {
    /// Whether the attempt made this node leader
    pub fn is_elected(&self) -> bool {
        matches!(self, ElectionOutcome::Elected { .. })
    }
}

/// Timing bounds for one election attempt
#[derive(Debug, Clone, Copy)]
pub struct ElectionTimeouts {
    /// Bounded wait for canvass results
    pub collect_deadline: Duration,
    /// Elapsed time after which a win is flagged as possibly stale
    pub stale_after: Duration,
}

impl From<&ElectionSettings> for ElectionTimeouts {
    fn from(settings: &ElectionSettings) -> Self {
        Self {
            collect_deadline: settings.collect_deadline(),
            stale_after: settings.stale_after(),
        }
    }
}

/// Clears the in-progress flag on every exit path
struct InProgressGuard<'a> {
    flag: &'a Mutex<bool>,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

/// Election coordinator manages self-election attempts
pub struct ElectionCoordinator {
    /// Replica set name
    set_name: String,
    /// Cluster membership
    registry: Arc<MemberRegistry>,
    /// Quorum arithmetic
    quorum: Arc<QuorumCalculator>,
    /// Per-peer vote requests
    canvasser: VoteCanvasser,
    /// Local role
    role: Arc<RoleState>,
    /// This node's vote, shared with the responder
    ledger: Arc<VoteLedger>,
    /// Timing bounds
    timeouts: ElectionTimeouts,
    /// Single-flight flag; the lock is held only to check-and-set it
    in_progress: Mutex<bool>,
}

impl ElectionCoordinator {
    /// Create a new election coordinator
    pub fn new(
        set_name: String,
        registry: Arc<MemberRegistry>,
        quorum: Arc<QuorumCalculator>,
        canvasser: VoteCanvasser,
        role: Arc<RoleState>,
        ledger: Arc<VoteLedger>,
        timeouts: ElectionTimeouts,
    ) -> Self {
        Self {
            set_name,
            registry,
            quorum,
            canvasser,
            role,
            ledger,
            timeouts,
            in_progress: Mutex::new(false),
        }
    }

    /// Whether an attempt is currently running
    pub fn in_progress(&self) -> bool {
        *self.in_progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Role as seen from outside: a follower with an attempt in flight is a candidate
    pub fn role(&self) -> NodeRole {
        match self.role.current() {
            NodeRole::Follower if self.in_progress() => NodeRole::Candidate,
            role => role,
        }
    }

    /// Claim the single-flight flag, or `None` if an attempt is running
    fn try_begin(&self) -> Option<InProgressGuard<'_>> {
        let mut flag = self.in_progress.lock().unwrap_or_else(PoisonError::into_inner);
        if *flag {
            return None;
        }
        *flag = true;
        Some(InProgressGuard { flag: &self.in_progress })
    }

    /// Try to become leader.
    ///
    /// Returns immediately with [`ElectionOutcome::AlreadyInProgress`] if
    /// another attempt is running. Errors and panics inside the attempt are
    /// swallowed and reported as [`ElectionOutcome::Failed`]; the role is
    /// only changed when a majority is reached.
    ///
    /// The node's own vote is leased to itself for the attempt, so it is
    /// not granted to another candidate meanwhile. The lease is kept only
    /// when the attempt wins.
    pub async fn elect_self(&self) -> ElectionOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Election already in progress, ignoring request");
            return ElectionOutcome::AlreadyInProgress;
        };

        let outcome = self.attempt().await;
        if !outcome.is_elected() {
            self.ledger.release(self.registry.me().member_id);
        }
        outcome
    }

    async fn attempt(&self) -> ElectionOutcome {
        match AssertUnwindSafe(self.run_election()).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!("Election attempt failed: {}", e);
                ElectionOutcome::Failed
            }
            Err(_) => {
                tracing::error!("Election attempt panicked");
                ElectionOutcome::Failed
            }
        }
    }

    async fn run_election(&self) -> Result<ElectionOutcome> {
        if self.set_name.is_empty() {
            return Err(Error::Election("replica set name is not configured".into()));
        }

        let snapshot = self.registry.snapshot().await;
        let me = snapshot.me.clone();

        if let Err(holder) = self.ledger.try_grant(me.member_id) {
            tracing::info!("Not standing: vote already granted to member {}", holder);
            return Ok(ElectionOutcome::VoteLeased { holder });
        }

        let request = Arc::new(ElectionRequest {
            set_name: self.set_name.clone(),
            candidate_address: me.address.clone(),
            candidate_member_id: me.member_id,
            config_version: snapshot.config_version,
        });

        // Liveness is sampled once, here
        let candidates: Vec<Member> = snapshot.live_peers().cloned().collect();

        let started = Instant::now();
        tracing::info!(
            "Standing for election in {} (config version {}, canvassing {} live peers)",
            self.set_name,
            snapshot.config_version,
            candidates.len()
        );

        let results = self.canvass_all(candidates, request).await;

        let mut tally = me.votes as i64;
        for (peer_id, result) in &results {
            if let VoteResult::Vote(v) = result {
                if *v < 0 {
                    tracing::info!("Candidacy vetoed by {} ({})", peer_id, v);
                }
            }
            tally += result.value();
        }

        // Fresh total at tally time
        let total_votes = self.quorum.total_votes().await;

        if !is_majority(tally, total_votes) {
            tracing::info!(
                "Not elected: tally {} of {} votes ({} responses)",
                tally,
                total_votes,
                results.len()
            );
            return Ok(ElectionOutcome::NotElected { tally, total_votes });
        }

        let elapsed = started.elapsed();
        if elapsed > self.timeouts.stale_after {
            tracing::warn!(
                "Too much time passed during election ({:?}); result may be stale",
                elapsed
            );
        }

        self.role.promote_to_leader();
        tracing::info!(
            "Elected self as LEADER of {}: tally {} of {} votes",
            self.set_name,
            tally,
            total_votes
        );

        Ok(ElectionOutcome::Elected { tally, total_votes })
    }

    /// Canvass every candidate concurrently, waiting at most the collection
    /// deadline. Canvassers still running at the deadline are left to finish
    /// on their own; their results are dropped.
    async fn canvass_all(
        &self,
        candidates: Vec<Member>,
        request: Arc<ElectionRequest>,
    ) -> Vec<(String, VoteResult)> {
        let expected = candidates.len();
        let (tx, mut rx) = mpsc::channel(expected.max(1));

        for peer in candidates {
            let tx = tx.clone();
            let canvasser = self.canvasser.clone();
            let request = Arc::clone(&request);
            tokio::spawn(async move {
                let result = canvasser.canvass(&peer, &request).await;
                let _ = tx.send((peer.id, result)).await;
            });
        }
        drop(tx);

        let deadline = tokio::time::Instant::now() + self.timeouts.collect_deadline;
        let mut results = Vec::with_capacity(expected);

        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(result)) => results.push(result),
                // All canvassers finished (or died)
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Election deadline reached with {}/{} responses",
                        results.len(),
                        expected
                    );
                    break;
                }
            }
        }

        results
    }
}
