mod room;
mod timer;
mod vote;

pub use room::{normalize_code, room_public_state, sanitize_poll_inputs, RoomError};
pub use vote::VoteOutcome;

use crate::config::ServerConfig;
use crate::persist::{ParticipantRecord, PollStore, RoomRecord, TallySnapshot};
use crate::registry::ConnectionRegistry;
use crate::types::{Room, RoomCode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared application state: the Room Store, the Connection Registry and the
/// optional persistence collaborator.
///
/// The rooms map's outer lock only guards membership; every room mutation
/// (join, vote, start, timer tick) goes through that room's own mutex, so
/// rooms are serialized individually and never against each other.
pub struct AppState {
    pub config: ServerConfig,
    pub rooms: RwLock<HashMap<RoomCode, Arc<Mutex<Room>>>>,
    pub registry: ConnectionRegistry,
    store: Option<Arc<dyn PollStore>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
            registry: ConnectionRegistry::new(),
            store: None,
        }
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn PollStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(config)
        }
    }

    /// Mirror a freshly created room to storage. Fire-and-forget: failures
    /// are logged, never surfaced, and nothing waits on the write.
    pub(crate) fn schedule_save(&self, room: &Room) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let record = RoomRecord::from_room(room);
        tokio::spawn(async move {
            if let Err(e) = store.save(&record).await {
                tracing::warn!(room = %record.room_id, error = %e, "failed to save room");
            }
        });
    }

    pub(crate) fn schedule_update_tally(&self, room: &Room) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let room_id = room.code.clone();
        let snapshot = TallySnapshot::from_room(room);
        tokio::spawn(async move {
            if let Err(e) = store.update_tally(&room_id, snapshot).await {
                tracing::warn!(room = %room_id, error = %e, "failed to update tally");
            }
        });
    }

    pub(crate) fn schedule_update_participants(&self, room: &Room) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let room_id = room.code.clone();
        let participants = ParticipantRecord::from_room(room);
        tokio::spawn(async move {
            if let Err(e) = store.update_participants(&room_id, participants).await {
                tracing::warn!(room = %room_id, error = %e, "failed to update participants");
            }
        });
    }

    /// Repopulate the Room Store from the persistence collaborator at
    /// startup. Storage being unavailable degrades to an empty store.
    pub async fn load_persisted(&self) {
        let Some(store) = &self.store else {
            return;
        };
        match store.load_all().await {
            Ok(records) => {
                let count = records.len();
                let mut rooms = self.rooms.write().await;
                for record in records {
                    let room = room::room_from_record(record);
                    rooms.insert(room.code.clone(), Arc::new(Mutex::new(room)));
                }
                tracing::info!(count, "restored rooms from storage");
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not load saved rooms, starting empty");
            }
        }
    }
}
