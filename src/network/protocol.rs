//! Wire Protocol
//!
//! Defines the messages exchanged between replica set members and the
//! frame header that wraps them on the wire.

use serde::{Deserialize, Serialize};

use crate::state::{ElectionRequest, Member, MembershipSummary, NodeRole};

/// Upper bound on a single frame body
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Protocol messages for node communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    // ========== Heartbeat/Health ==========
    /// Liveness probe sent to every peer
    Heartbeat {
        set_name: String,
        from_id: String,
        config_version: u64,
        role: NodeRole,
    },

    /// Heartbeat response
    HeartbeatResponse {
        from_id: String,
        role: NodeRole,
    },

    // ========== Leader Election ==========
    /// Vote request from a candidate
    Elect(ElectionRequest),

    /// Vote value: positive supports, zero abstains, `VETO` rejects
    ElectResponse {
        vote: i32,
    },

    // ========== Status ==========
    /// Status request
    StatusRequest,

    /// Status response
    StatusResponse(NodeStatusReport),

    // ========== Error ==========
    /// Error response
    Error {
        code: ErrorCode,
        message: String,
    },
}

/// Error codes for protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Request addressed to a different replica set
    WrongSet,
    /// Message not valid as a request
    UnexpectedMessage,
}

/// Point-in-time view of a node, returned by `StatusRequest`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusReport {
    pub node_id: String,
    pub set_name: String,
    pub role: NodeRole,
    pub config_version: u64,
    pub election_in_progress: bool,
    pub majority_up: bool,
    pub summary: MembershipSummary,
    pub members: Vec<Member>,
    pub reported_at: chrono::DateTime<chrono::Utc>,
}

impl Message {
    /// Serialize message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Heartbeat { .. } => "Heartbeat",
            Message::HeartbeatResponse { .. } => "HeartbeatResponse",
            Message::Elect(_) => "Elect",
            Message::ElectResponse { .. } => "ElectResponse",
            Message::StatusRequest => "StatusRequest",
            Message::StatusResponse(_) => "StatusResponse",
            Message::Error { .. } => "Error",
        }
    }
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Message length
    pub length: u32,
    /// Message checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Create a new frame header
    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            checksum: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}
