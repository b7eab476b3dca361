//! Room lifecycle: creation, lookup, joining and the public view.

use super::AppState;
use crate::persist::RoomRecord;
use crate::protocol::RoomStatePayload;
use crate::token;
use crate::types::{Participant, ParticipantId, Phase, Room, RoomCode};
use chrono::Utc;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const FALLBACK_QUESTION: &str = "Cats vs Dogs";
const MAX_OPTIONS: usize = 6;

fn fallback_options() -> Vec<String> {
    vec!["Cats".to_string(), "Dogs".to_string()]
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,
}

/// Room codes are case-insensitive on the wire; everything below the router
/// works with the normalized form.
pub fn normalize_code(code: &str) -> RoomCode {
    code.trim().to_uppercase()
}

/// Apply the creation-defaults contract: trim everything, drop empty
/// entries, cap at six options, and fall back to the canonical question and
/// option pair rather than erroring. A partial mix never happens; fewer than
/// two valid options replaces the whole list.
pub fn sanitize_poll_inputs(
    question: Option<String>,
    options: Option<Vec<String>>,
) -> (String, Vec<String>) {
    let question = question
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| FALLBACK_QUESTION.to_string());

    let mut options: Vec<String> = options
        .unwrap_or_default()
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    options.truncate(MAX_OPTIONS);
    if options.len() < 2 {
        options = fallback_options();
    }

    (question, options)
}

/// Identity-continuity policy: a joining participant whose display name
/// matches an existing entry is treated as that participant reconnecting,
/// and the entry is re-keyed to the new id. Two humans picking the same name
/// therefore collide; swap this function for a stricter identity scheme if
/// that ever matters.
fn reclaim_participant_by_name(
    participants: &IndexMap<ParticipantId, Participant>,
    username: &str,
) -> Option<ParticipantId> {
    participants
        .iter()
        .find(|(_, p)| p.username == username)
        .map(|(id, _)| id.clone())
}

/// Everything a client may see about a room. The creator credential and the
/// countdown handle never cross this boundary.
pub fn room_public_state(room: &Room, is_creator: Option<bool>) -> RoomStatePayload {
    RoomStatePayload {
        id: room.code.clone(),
        question: room.question.clone(),
        options: room.options.clone(),
        votes: room.tally.clone(),
        timer: room.remaining_seconds,
        status: room.phase,
        creator_id: room.creator_id.clone(),
        users: room.participants.values().cloned().collect(),
        is_creator,
    }
}

pub(super) fn room_from_record(mut record: RoomRecord) -> Room {
    // A hand-edited or corrupt store file may carry more options than a
    // room can ever hold; cap it like the create path does.
    record.options.truncate(MAX_OPTIONS);
    let options: Vec<String> = record.options.iter().map(|o| o.text.clone()).collect();
    let tally = record
        .options
        .iter()
        .enumerate()
        .map(|(i, o)| (Room::option_key(i), o.votes))
        .collect();
    Room {
        code: record.room_id,
        question: record.question,
        options,
        tally,
        participants: record
            .participants
            .into_iter()
            .map(|p| {
                (
                    p.user_id,
                    Participant {
                        username: p.username,
                        voted: p.voted,
                    },
                )
            })
            .collect(),
        voter_origins: record.voter_origins.into_iter().collect(),
        phase: record.status,
        remaining_seconds: record.timer,
        creator_id: record.creator_id,
        // The credential is never persisted, so mint a fresh one nobody
        // holds: creator authority does not survive a restart.
        creator_credential: token::generate_creator_token(),
        creator_connection_id: None,
        created_at: record.created_at,
        countdown: None,
    }
}

impl AppState {
    /// Create a new room and return its code.
    ///
    /// This never fails: bad input is substituted with defaults, not
    /// rejected. Callers wanting strict validation do it before calling.
    pub async fn create_room(
        &self,
        question: Option<String>,
        options: Option<Vec<String>>,
        creator_id: &str,
    ) -> RoomCode {
        let (question, options) = sanitize_poll_inputs(question, options);

        let mut rooms = self.rooms.write().await;
        // Collision - try again (negligible odds with ~28M codes)
        let code = loop {
            let candidate = token::generate_room_code();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let tally = Room::tally_for(&options);
        let room = Room {
            code: code.clone(),
            question,
            options,
            tally,
            participants: IndexMap::new(),
            voter_origins: Default::default(),
            phase: Phase::Waiting,
            remaining_seconds: self.config.poll_seconds,
            creator_id: creator_id.to_string(),
            creator_credential: token::generate_creator_token(),
            creator_connection_id: None,
            created_at: Utc::now(),
            countdown: None,
        };

        self.schedule_save(&room);
        rooms.insert(code.clone(), Arc::new(Mutex::new(room)));
        tracing::info!(room = %code, creator = creator_id, "room created");
        code
    }

    pub async fn get_room(&self, code: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.read().await.get(&normalize_code(code)).cloned()
    }

    /// Add a participant to a room, or re-key an existing same-name entry
    /// (see [`reclaim_participant_by_name`]).
    pub async fn join_room(
        &self,
        code: &str,
        participant_id: &str,
        username: &str,
    ) -> Result<(), RoomError> {
        let room = self.get_room(code).await.ok_or(RoomError::RoomNotFound)?;
        let mut room = room.lock().await;

        if let Some(existing_id) = reclaim_participant_by_name(&room.participants, username) {
            if existing_id != participant_id {
                if let Some(entry) = room.participants.shift_remove(&existing_id) {
                    room.participants.insert(participant_id.to_string(), entry);
                }
            }
        } else {
            room.participants.insert(
                participant_id.to_string(),
                Participant {
                    username: username.to_string(),
                    voted: false,
                },
            );
        }

        self.schedule_update_participants(&room);
        Ok(())
    }

    /// True only if the room exists and the token matches its credential
    /// exactly.
    pub async fn validate_creator_token(&self, code: &str, token: &str) -> bool {
        match self.get_room(code).await {
            Some(room) => room.lock().await.creator_credential == token,
            None => false,
        }
    }

    pub async fn public_view(&self, code: &str, is_creator: Option<bool>) -> Option<RoomStatePayload> {
        let room = self.get_room(code).await?;
        let room = room.lock().await;
        Some(room_public_state(&room, is_creator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn state() -> AppState {
        AppState::new(ServerConfig::default())
    }

    #[test]
    fn test_sanitize_defaults_when_absent() {
        let (question, options) = sanitize_poll_inputs(None, None);
        assert_eq!(question, "Cats vs Dogs");
        assert_eq!(options, vec!["Cats", "Dogs"]);
    }

    #[test]
    fn test_sanitize_trims_and_drops_empty_entries() {
        let (question, options) = sanitize_poll_inputs(
            Some("  Best pet?  ".to_string()),
            Some(vec![
                " Cats ".to_string(),
                "".to_string(),
                "   ".to_string(),
                "Dogs".to_string(),
            ]),
        );
        assert_eq!(question, "Best pet?");
        assert_eq!(options, vec!["Cats", "Dogs"]);
    }

    #[test]
    fn test_sanitize_truncates_to_six() {
        let options: Vec<String> = (1..=9).map(|i| format!("opt{}", i)).collect();
        let (_, options) = sanitize_poll_inputs(None, Some(options));
        assert_eq!(options.len(), 6);
        assert_eq!(options[5], "opt6");
    }

    #[test]
    fn test_sanitize_never_yields_partial_mix() {
        // One valid option left: the whole list is replaced, not padded.
        let (_, options) =
            sanitize_poll_inputs(None, Some(vec!["Only".to_string(), "  ".to_string()]));
        assert_eq!(options, vec!["Cats", "Dogs"]);
    }

    #[tokio::test]
    async fn test_create_room_has_matching_tally_keys() {
        let state = state();
        let code = state
            .create_room(
                Some("Cats or Dogs?".to_string()),
                Some(vec!["Cats".to_string(), "Dogs".to_string()]),
                "u-1",
            )
            .await;

        let room = state.get_room(&code).await.unwrap();
        let room = room.lock().await;
        assert_eq!(room.question, "Cats or Dogs?");
        assert_eq!(room.phase, Phase::Waiting);
        assert_eq!(room.tally.get("A"), Some(&0));
        assert_eq!(room.tally.get("B"), Some(&0));
        assert_eq!(room.tally.len(), 2);
        assert_eq!(room.remaining_seconds, 60);
        assert!(!room.creator_credential.is_empty());
    }

    #[tokio::test]
    async fn test_room_lookup_is_case_insensitive() {
        let state = state();
        let code = state.create_room(None, None, "u-1").await;
        assert!(state.get_room(&code.to_lowercase()).await.is_some());
        assert!(state.get_room(&format!("  {} ", code)).await.is_some());
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let state = state();
        let result = state.join_room("ZZZZZ", "u-1", "alice").await;
        assert_eq!(result, Err(RoomError::RoomNotFound));
    }

    #[tokio::test]
    async fn test_join_rekeys_same_display_name() {
        let state = state();
        let code = state.create_room(None, None, "u-1").await;
        state.join_room(&code, "u-1", "alice").await.unwrap();
        state.join_room(&code, "u-2", "alice").await.unwrap();

        let room = state.get_room(&code).await.unwrap();
        let room = room.lock().await;
        assert_eq!(room.participants.len(), 1);
        assert!(room.participants.contains_key("u-2"));
        assert!(!room.participants.contains_key("u-1"));
    }

    #[tokio::test]
    async fn test_rekey_preserves_voted_flag() {
        let state = state();
        let code = state.create_room(None, None, "u-1").await;
        state.join_room(&code, "u-1", "alice").await.unwrap();
        {
            let room = state.get_room(&code).await.unwrap();
            let mut room = room.lock().await;
            room.phase = Phase::Active;
        }
        assert_eq!(
            state.cast_vote(&code, "u-1", "A", None).await,
            crate::state::VoteOutcome::Recorded
        );

        state.join_room(&code, "u-9", "alice").await.unwrap();
        let room = state.get_room(&code).await.unwrap();
        let room = room.lock().await;
        assert!(room.participants.get("u-9").unwrap().voted);
    }

    #[tokio::test]
    async fn test_distinct_names_coexist() {
        let state = state();
        let code = state.create_room(None, None, "u-1").await;
        state.join_room(&code, "u-1", "alice").await.unwrap();
        state.join_room(&code, "u-2", "bob").await.unwrap();

        let room = state.get_room(&code).await.unwrap();
        let room = room.lock().await;
        assert_eq!(room.participants.len(), 2);
        // Insertion order is kept for display stability
        let names: Vec<_> = room.participants.values().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_validate_creator_token() {
        let state = state();
        let code = state.create_room(None, None, "u-1").await;
        let token = {
            let room = state.get_room(&code).await.unwrap();
            let room = room.lock().await;
            room.creator_credential.clone()
        };

        assert!(state.validate_creator_token(&code, &token).await);
        assert!(!state.validate_creator_token(&code, "wrong").await);
        assert!(!state.validate_creator_token("ZZZZZ", &token).await);
    }

    #[tokio::test]
    async fn test_public_view_strips_credential() {
        let state = state();
        let code = state.create_room(None, None, "u-1").await;
        state.join_room(&code, "u-1", "alice").await.unwrap();

        let view = state.public_view(&code, None).await.unwrap();
        let json = serde_json::to_string(&view).unwrap();
        let token = {
            let room = state.get_room(&code).await.unwrap();
            let room = room.lock().await;
            room.creator_credential.clone()
        };
        assert!(!json.contains(&token));
        assert_eq!(view.users.len(), 1);
        assert_eq!(view.status, Phase::Waiting);
    }

    #[tokio::test]
    async fn test_room_from_record_restores_tally() {
        use crate::persist::{OptionRecord, ParticipantRecord, RoomRecord};

        let record = RoomRecord {
            room_id: "AAAAA".to_string(),
            question: "Q".to_string(),
            options: vec![
                OptionRecord {
                    text: "Cats".to_string(),
                    votes: 2,
                },
                OptionRecord {
                    text: "Dogs".to_string(),
                    votes: 1,
                },
            ],
            status: Phase::Active,
            participants: vec![ParticipantRecord {
                user_id: "u-1".to_string(),
                username: "alice".to_string(),
                voted: true,
            }],
            creator_id: "u-1".to_string(),
            timer: 42,
            voter_origins: vec!["10.0.0.1".to_string()],
            created_at: Utc::now(),
        };

        let room = room_from_record(record);
        assert_eq!(room.tally.get("A"), Some(&2));
        assert_eq!(room.tally.get("B"), Some(&1));
        assert_eq!(room.phase, Phase::Active);
        assert_eq!(room.remaining_seconds, 42);
        assert!(room.voter_origins.contains("10.0.0.1"));
        assert!(room.participants.get("u-1").unwrap().voted);
        assert!(!room.creator_credential.is_empty());
    }

    #[test]
    fn test_room_from_record_caps_oversized_option_list() {
        use crate::persist::{OptionRecord, RoomRecord};

        // Far past where positional keys stop being single letters; the
        // restore must cap instead of panicking.
        let record = RoomRecord {
            room_id: "AAAAA".to_string(),
            question: "Q".to_string(),
            options: (0..300)
                .map(|i| OptionRecord {
                    text: format!("opt{}", i),
                    votes: 0,
                })
                .collect(),
            status: Phase::Waiting,
            participants: vec![],
            creator_id: "u-1".to_string(),
            timer: 60,
            voter_origins: vec![],
            created_at: Utc::now(),
        };

        let room = room_from_record(record);
        assert_eq!(room.options.len(), MAX_OPTIONS);
        assert_eq!(room.tally.len(), MAX_OPTIONS);
        assert!(room.tally.contains_key("F"));
        assert!(!room.tally.contains_key("G"));
    }
}
