use crate::types::{Participant, ParticipantId, Phase, Role, RoomCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inbound client events. Every message on the wire is a JSON object with a
/// `type` discriminator and a `payload` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a room; missing or invalid question/options are silently
    /// replaced with defaults.
    CreateRoom {
        username: String,
        question: Option<String>,
        options: Option<Vec<String>>,
        #[serde(rename = "userId")]
        user_id: Option<String>,
    },
    /// Create a room with a custom poll; unlike `create_room` this rejects
    /// invalid input with an explicit error instead of substituting defaults.
    CreateDynamicRoom {
        username: String,
        question: Option<String>,
        options: Option<Vec<String>>,
        #[serde(rename = "userId")]
        user_id: Option<String>,
    },
    JoinRoom {
        username: String,
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId")]
        user_id: Option<String>,
        #[serde(rename = "creatorToken")]
        creator_token: Option<String>,
    },
    GetRoomState {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Vote {
        #[serde(rename = "roomId")]
        room_id: String,
        /// Option key ("A", "B", ...), not the option label.
        option: String,
        #[serde(rename = "userId")]
        user_id: Option<String>,
    },
    StartPoll {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId")]
        user_id: Option<String>,
    },
}

/// Outbound server events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename = "ROLE")]
    Role { role: Role },
    /// Sent only to the creating connection; the only message that ever
    /// carries the creator credential.
    RoomCreated(RoomCreatedPayload),
    RoomUpdate(RoomStatePayload),
    Error { message: String },
}

/// Public view of a room: everything a client may see. The creator
/// credential and the countdown handle are stripped before this is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatePayload {
    pub id: RoomCode,
    pub question: String,
    pub options: Vec<String>,
    pub votes: BTreeMap<String, u32>,
    pub timer: u32,
    pub status: Phase,
    pub creator_id: ParticipantId,
    pub users: Vec<Participant>,
    /// Present only on direct replies where the recipient's role is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_creator: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedPayload {
    #[serde(flatten)]
    pub room: RoomStatePayload,
    pub creator_token: String,
}
