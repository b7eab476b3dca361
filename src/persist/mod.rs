//! Best-effort persistence of room state.
//!
//! The in-memory Room Store stays authoritative; everything here is a
//! derived, eventually-consistent mirror. Callers fire writes from spawned
//! tasks and never block a protocol reply on the outcome.

mod file;

pub use file::FileStore;

use crate::types::Phase;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionRecord {
    pub text: String,
    pub votes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantRecord {
    pub user_id: String,
    pub username: String,
    pub voted: bool,
}

/// A saved room. The creator credential is deliberately not persisted:
/// creator authority does not survive a process restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomRecord {
    pub room_id: String,
    pub question: String,
    pub options: Vec<OptionRecord>,
    pub status: Phase,
    pub participants: Vec<ParticipantRecord>,
    pub creator_id: String,
    pub timer: u32,
    pub voter_origins: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Tally-and-phase snapshot written after every admitted vote and on phase
/// transitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TallySnapshot {
    pub votes: BTreeMap<String, u32>,
    pub status: Phase,
    pub timer: u32,
    pub voter_origins: Vec<String>,
}

impl RoomRecord {
    pub fn from_room(room: &crate::types::Room) -> Self {
        Self {
            room_id: room.code.clone(),
            question: room.question.clone(),
            options: room
                .options
                .iter()
                .enumerate()
                .map(|(i, text)| OptionRecord {
                    text: text.clone(),
                    votes: room
                        .tally
                        .get(&crate::types::Room::option_key(i))
                        .copied()
                        .unwrap_or(0),
                })
                .collect(),
            status: room.phase,
            participants: ParticipantRecord::from_room(room),
            creator_id: room.creator_id.clone(),
            timer: room.remaining_seconds,
            voter_origins: room.voter_origins.iter().cloned().collect(),
            created_at: room.created_at,
        }
    }
}

impl TallySnapshot {
    pub fn from_room(room: &crate::types::Room) -> Self {
        Self {
            votes: room.tally.clone(),
            status: room.phase,
            timer: room.remaining_seconds,
            voter_origins: room.voter_origins.iter().cloned().collect(),
        }
    }
}

impl ParticipantRecord {
    pub fn from_room(room: &crate::types::Room) -> Vec<Self> {
        room.participants
            .iter()
            .map(|(id, p)| Self {
                user_id: id.clone(),
                username: p.username.clone(),
                voted: p.voted,
            })
            .collect()
    }
}

/// Storage collaborator contract. Implementations must be safe to call
/// concurrently; every method is best-effort from the caller's view.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn save(&self, room: &RoomRecord) -> StoreResult<()>;

    /// Load previously saved rooms, excluding rooms that have been closed
    /// for longer than the retention window.
    async fn load_all(&self) -> StoreResult<Vec<RoomRecord>>;

    async fn update_tally(&self, room_id: &str, snapshot: TallySnapshot) -> StoreResult<()>;

    async fn update_participants(
        &self,
        room_id: &str,
        participants: Vec<ParticipantRecord>,
    ) -> StoreResult<()>;
}
