//! Message Router: the sole mutator of connection bindings and the only
//! caller into the Room Store, Vote Ledger and Poll Timer.

use crate::protocol::{ClientMessage, RoomCreatedPayload, ServerMessage};
use crate::registry::OutboundSender;
use crate::state::{normalize_code, room_public_state, AppState, RoomError, VoteOutcome};
use crate::types::{ConnectionId, ParticipantId, Phase, Role, RoomCode};
use std::sync::Arc;

/// Live association between a transport connection and a
/// (room, participant, role) triple. Owned by the socket task, mutated only
/// by this router, destroyed with the connection.
#[derive(Debug, Clone)]
pub struct ConnBinding {
    pub connection_id: ConnectionId,
    pub room_code: Option<RoomCode>,
    pub participant_id: Option<ParticipantId>,
    pub is_creator: bool,
}

impl ConnBinding {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            room_code: None,
            participant_id: None,
            is_creator: false,
        }
    }
}

fn send(out: &OutboundSender, msg: ServerMessage) {
    // A connection that vanished mid-reply is simply skipped.
    let _ = out.send(msg);
}

fn error(message: &str) -> ServerMessage {
    ServerMessage::Error {
        message: message.to_string(),
    }
}

async fn broadcast_room(state: &Arc<AppState>, code: &str) {
    if let Some(view) = state.public_view(code, None).await {
        state
            .registry
            .broadcast(code, ServerMessage::RoomUpdate(view))
            .await;
    }
}

/// The dynamic creation path rejects what the plain path would silently
/// default: a missing/blank question, fewer than two options, or any blank
/// option entry.
fn dynamic_inputs_valid(question: &Option<String>, options: &Option<Vec<String>>) -> bool {
    let question_ok = question
        .as_deref()
        .map(|q| !q.trim().is_empty())
        .unwrap_or(false);
    let options_ok = options
        .as_ref()
        .map(|o| o.len() >= 2 && o.iter().all(|opt| !opt.trim().is_empty()))
        .unwrap_or(false);
    question_ok && options_ok
}

/// Handle one inbound client event.
pub async fn handle_message(
    msg: ClientMessage,
    binding: &mut ConnBinding,
    out: &OutboundSender,
    origin: Option<&str>,
    state: &Arc<AppState>,
) {
    match msg {
        ClientMessage::CreateRoom {
            username,
            question,
            options,
            user_id,
        } => {
            create_room_flow(binding, out, state, username, question, options, user_id).await;
        }

        ClientMessage::CreateDynamicRoom {
            username,
            question,
            options,
            user_id,
        } => {
            if !dynamic_inputs_valid(&question, &options) {
                tracing::info!(connection = %binding.connection_id, "rejected invalid dynamic room request");
                send(
                    out,
                    error("Invalid poll configuration. Question and at least 2 options required."),
                );
                return;
            }
            create_room_flow(binding, out, state, username, question, options, user_id).await;
        }

        ClientMessage::JoinRoom {
            username,
            room_id,
            user_id,
            creator_token,
        } => {
            let code = normalize_code(&room_id);
            let participant_id = user_id.unwrap_or_else(|| binding.connection_id.clone());

            if let Err(RoomError::RoomNotFound) =
                state.join_room(&code, &participant_id, &username).await
            {
                send(out, error("Room not found"));
                return;
            }

            let is_creator = match &creator_token {
                Some(token) => state.validate_creator_token(&code, token).await,
                None => false,
            };
            if is_creator {
                if let Some(room) = state.get_room(&code).await {
                    room.lock().await.creator_connection_id = Some(binding.connection_id.clone());
                }
                tracing::info!(room = %code, connection = %binding.connection_id, "creator reconnected with valid token");
            }

            rebind(binding, out, state, &code).await;
            binding.participant_id = Some(participant_id.clone());
            binding.is_creator = is_creator;

            let role = if is_creator { Role::Creator } else { Role::User };
            send(out, ServerMessage::Role { role });
            if let Some(view) = state.public_view(&code, Some(is_creator)).await {
                send(out, ServerMessage::RoomUpdate(view));
            }
            tracing::info!(room = %code, participant = %participant_id, username = %username, "participant joined room");
            broadcast_room(state, &code).await;
        }

        ClientMessage::GetRoomState { room_id } => {
            let code = normalize_code(&room_id);
            // Read-only; a nonexistent room gets no reply at all.
            let Some(view) = state.public_view(&code, Some(binding.is_creator)).await else {
                return;
            };
            let role = if binding.is_creator {
                Role::Creator
            } else {
                Role::User
            };
            send(out, ServerMessage::Role { role });
            send(out, ServerMessage::RoomUpdate(view));
        }

        ClientMessage::Vote {
            room_id,
            option,
            user_id,
        } => {
            let code = normalize_code(&room_id);
            let Some(participant_id) = user_id.or_else(|| binding.participant_id.clone()) else {
                return;
            };

            match state
                .cast_vote(&code, &participant_id, &option, origin.map(str::to_string))
                .await
            {
                VoteOutcome::Recorded => broadcast_room(state, &code).await,
                VoteOutcome::NotStarted => send(
                    out,
                    error("Poll has not started yet. Waiting for creator to start."),
                ),
                VoteOutcome::Ended => send(out, error("Voting is closed. Poll has ended.")),
                // Duplicate and malformed votes stay silent so the reply
                // never reveals who already voted.
                VoteOutcome::Ignored | VoteOutcome::RoomMissing => {}
            }
        }

        ClientMessage::StartPoll { room_id, user_id } => {
            let code = normalize_code(&room_id);
            let Some(room) = state.get_room(&code).await else {
                send(out, error("Room not found"));
                return;
            };
            let requesting = user_id.or_else(|| binding.participant_id.clone());

            let reply = {
                let mut room = room.lock().await;
                if requesting.as_deref() != Some(room.creator_id.as_str()) {
                    tracing::warn!(room = %code, requesting = ?requesting, "unauthorized start_poll attempt");
                    Some(error("Only the room creator can start the poll."))
                } else {
                    match room.phase {
                        Phase::Active => Some(error("Poll is already active.")),
                        Phase::Closed => {
                            Some(error("Cannot start poll. Poll has already ended."))
                        }
                        Phase::Waiting => {
                            room.phase = Phase::Active;
                            state.arm_countdown(&mut room);
                            state.schedule_update_tally(&room);
                            tracing::info!(room = %code, "poll started");
                            None
                        }
                    }
                }
            };

            match reply {
                Some(msg) => send(out, msg),
                None => broadcast_room(state, &code).await,
            }
        }
    }
}

async fn create_room_flow(
    binding: &mut ConnBinding,
    out: &OutboundSender,
    state: &Arc<AppState>,
    username: String,
    question: Option<String>,
    options: Option<Vec<String>>,
    user_id: Option<String>,
) {
    let participant_id = user_id.unwrap_or_else(|| binding.connection_id.clone());
    let code = state.create_room(question, options, &participant_id).await;
    if let Err(e) = state.join_room(&code, &participant_id, &username).await {
        // The room was just created; this cannot miss.
        tracing::error!(room = %code, error = %e, "creator failed to join own room");
        return;
    }

    rebind(binding, out, state, &code).await;
    binding.participant_id = Some(participant_id.clone());
    binding.is_creator = true;

    send(out, ServerMessage::Role { role: Role::Creator });

    let created = {
        let Some(room) = state.get_room(&code).await else {
            return;
        };
        let mut room = room.lock().await;
        room.creator_connection_id = Some(binding.connection_id.clone());
        RoomCreatedPayload {
            room: room_public_state(&room, None),
            creator_token: room.creator_credential.clone(),
        }
    };
    send(out, ServerMessage::RoomCreated(created));
    tracing::info!(room = %code, participant = %participant_id, username = %username, "room created and joined");
    broadcast_room(state, &code).await;
}

/// Move the connection's registry entry to a new room.
async fn rebind(binding: &mut ConnBinding, out: &OutboundSender, state: &Arc<AppState>, code: &str) {
    if let Some(previous) = binding.room_code.take() {
        if previous != code {
            state.registry.unbind(&previous, &binding.connection_id).await;
        }
    }
    binding.room_code = Some(code.to_string());
    state
        .registry
        .bind(code, &binding.connection_id, out.clone())
        .await;
}
