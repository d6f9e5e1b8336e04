//! State Management Module
//!
//! Membership, quorum arithmetic, the local role and the election
//! machinery built on top of them.

mod membership;
mod role;
pub mod quorum;
pub mod canvass;
pub mod election;
pub mod responder;

pub use membership::{Member, MemberRegistry, MembershipSnapshot, MembershipSummary};
pub use role::{NodeRole, RoleState};
pub use quorum::QuorumCalculator;
pub use canvass::{ElectionRequest, VoteCanvasser, VoteResult, VoteTransport, VETO};
pub use election::{ElectionCoordinator, ElectionOutcome, ElectionTimeouts};
pub use responder::{VoteLedger, VoteResponder};
