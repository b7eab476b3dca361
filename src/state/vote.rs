//! Vote admission and deduplication.

use super::AppState;
use crate::types::Phase;

/// What happened to a vote attempt. Only the phase rejections are surfaced
/// to the voter; everything else is deliberately silent so a rejection never
/// reveals who has already voted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Tally incremented, participant marked voted, origin recorded.
    Recorded,
    /// Room is still in `waiting`.
    NotStarted,
    /// Room is already `closed`.
    Ended,
    /// Duplicate vote, unknown participant or invalid option key.
    Ignored,
    /// No such room.
    RoomMissing,
}

impl AppState {
    /// Admit a single vote.
    ///
    /// All checks and all effects happen under the room's lock: a vote never
    /// increments the tally without also marking the participant voted and
    /// recording the origin, and never races a timer tick.
    pub async fn cast_vote(
        &self,
        code: &str,
        participant_id: &str,
        option_key: &str,
        origin: Option<String>,
    ) -> VoteOutcome {
        let Some(room) = self.get_room(code).await else {
            return VoteOutcome::RoomMissing;
        };
        let mut room = room.lock().await;

        match room.phase {
            Phase::Waiting => return VoteOutcome::NotStarted,
            Phase::Closed => return VoteOutcome::Ended,
            Phase::Active => {}
        }

        if !room.tally.contains_key(option_key) {
            tracing::debug!(room = %room.code, option = option_key, "vote for unknown option");
            return VoteOutcome::Ignored;
        }

        if let Some(ip) = &origin {
            if room.voter_origins.contains(ip) {
                tracing::info!(room = %room.code, "rejected duplicate vote from known origin");
                return VoteOutcome::Ignored;
            }
        }

        match room.participants.get_mut(participant_id) {
            None => return VoteOutcome::Ignored,
            Some(p) if p.voted => {
                tracing::debug!(room = %room.code, participant = participant_id, "participant already voted");
                return VoteOutcome::Ignored;
            }
            Some(p) => p.voted = true,
        }

        if let Some(count) = room.tally.get_mut(option_key) {
            *count += 1;
        }
        if let Some(ip) = origin {
            room.voter_origins.insert(ip);
        }

        self.schedule_update_tally(&room);
        self.schedule_update_participants(&room);
        VoteOutcome::Recorded
    }
}
