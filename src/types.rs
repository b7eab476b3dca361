use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tokio::task::JoinHandle;

/// Opaque ID types for type safety
pub type RoomCode = String;
pub type ParticipantId = String;
pub type ConnectionId = String;

/// Lifecycle of a poll room. Transitions are monotonic:
/// `Waiting -> Active -> Closed`, never backwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Creator,
    User,
}

/// A room member as seen by every client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub username: String,
    pub voted: bool,
}

/// A single poll room. Lives only in the Room Store; clients and the
/// persistence layer see derived snapshots, never this struct.
#[derive(Debug)]
pub struct Room {
    pub code: RoomCode,
    pub question: String,
    pub options: Vec<String>,
    /// Counts keyed by option key ("A", "B", ...), fixed at creation.
    pub tally: BTreeMap<String, u32>,
    /// Insertion order is kept for display stability.
    pub participants: IndexMap<ParticipantId, Participant>,
    /// Network origins that already voted; grows monotonically.
    pub voter_origins: HashSet<String>,
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub creator_id: ParticipantId,
    /// Proves creator authority across reconnects. Set once, never broadcast.
    pub creator_credential: String,
    /// The connection currently recognized as the creator.
    pub creator_connection_id: Option<ConnectionId>,
    pub created_at: DateTime<Utc>,
    /// Live countdown task, at most one per room.
    pub countdown: Option<JoinHandle<()>>,
}

impl Room {
    /// Option key for a zero-based option index: 0 -> "A", 1 -> "B", ...
    pub fn option_key(index: usize) -> String {
        ((b'A' + index as u8) as char).to_string()
    }

    /// Fresh zeroed tally with one key per option.
    pub fn tally_for(options: &[String]) -> BTreeMap<String, u32> {
        options
            .iter()
            .enumerate()
            .map(|(i, _)| (Self::option_key(i), 0))
            .collect()
    }
}
