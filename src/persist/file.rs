//! JSON-file implementation of the storage contract.
//!
//! All saved rooms live in a single schema-versioned document. Writes go
//! through a temp file plus rename so a crash mid-write cannot truncate the
//! previous document.

use super::{ParticipantRecord, PollStore, RoomRecord, StoreResult, TallySnapshot};
use crate::types::Phase;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Bump when the document layout changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    schema_version: u32,
    rooms: HashMap<String, RoomRecord>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            rooms: HashMap::new(),
        }
    }
}

pub struct FileStore {
    path: PathBuf,
    retention: Duration,
    /// Serializes read-modify-write cycles on the document.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf, retention: Duration) -> Self {
        Self {
            path,
            retention,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_document(&self) -> StoreResult<StoreDocument> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, doc: &StoreDocument) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PollStore for FileStore {
    async fn save(&self, room: &RoomRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.rooms.insert(room.room_id.clone(), room.clone());
        self.write_document(&doc).await
    }

    async fn load_all(&self) -> StoreResult<Vec<RoomRecord>> {
        let doc = self.read_document().await?;
        let cutoff = Utc::now() - self.retention;
        Ok(doc
            .rooms
            .into_values()
            .filter(|r| !(r.status == Phase::Closed && r.created_at < cutoff))
            .collect())
    }

    async fn update_tally(&self, room_id: &str, snapshot: TallySnapshot) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?;
        let Some(record) = doc.rooms.get_mut(room_id) else {
            // Room was never saved; nothing to mirror.
            tracing::debug!(room_id, "skipping tally update for unsaved room");
            return Ok(());
        };
        for (index, option) in record.options.iter_mut().enumerate() {
            let key = crate::types::Room::option_key(index);
            option.votes = snapshot.votes.get(&key).copied().unwrap_or(option.votes);
        }
        record.status = snapshot.status;
        record.timer = snapshot.timer;
        record.voter_origins = snapshot.voter_origins;
        self.write_document(&doc).await
    }

    async fn update_participants(
        &self,
        room_id: &str,
        participants: Vec<ParticipantRecord>,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?;
        let Some(record) = doc.rooms.get_mut(room_id) else {
            tracing::debug!(room_id, "skipping participant update for unsaved room");
            return Ok(());
        };
        record.participants = participants;
        self.write_document(&doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::OptionRecord;
    use std::collections::BTreeMap;

    fn record(room_id: &str, status: Phase) -> RoomRecord {
        RoomRecord {
            room_id: room_id.to_string(),
            question: "Cats vs Dogs".to_string(),
            options: vec![
                OptionRecord {
                    text: "Cats".to_string(),
                    votes: 0,
                },
                OptionRecord {
                    text: "Dogs".to_string(),
                    votes: 0,
                },
            ],
            status,
            participants: vec![],
            creator_id: "u-1".to_string(),
            timer: 60,
            voter_origins: vec![],
            created_at: Utc::now(),
        }
    }

    fn store(dir: &tempfile::TempDir) -> FileStore {
        FileStore::new(dir.path().join("polls.json"), Duration::hours(24))
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.save(&record("AAAAA", Phase::Waiting)).await.unwrap();
        store.save(&record("BBBBB", Phase::Active)).await.unwrap();

        let mut loaded = store.load_all().await.unwrap();
        loaded.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].room_id, "AAAAA");
        assert_eq!(loaded[1].status, Phase::Active);
    }

    #[tokio::test]
    async fn test_load_all_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_drops_old_closed_rooms() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut stale = record("STALE", Phase::Closed);
        stale.created_at = Utc::now() - Duration::hours(48);
        let mut old_but_open = record("WAITS", Phase::Waiting);
        old_but_open.created_at = Utc::now() - Duration::hours(48);
        let fresh_closed = record("FRESH", Phase::Closed);

        store.save(&stale).await.unwrap();
        store.save(&old_but_open).await.unwrap();
        store.save(&fresh_closed).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.room_id.as_str()).collect();
        assert!(!ids.contains(&"STALE"));
        assert!(ids.contains(&"WAITS"));
        assert!(ids.contains(&"FRESH"));
    }

    #[tokio::test]
    async fn test_update_tally_rewrites_counts_and_phase() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.save(&record("AAAAA", Phase::Active)).await.unwrap();

        let mut votes = BTreeMap::new();
        votes.insert("A".to_string(), 3);
        votes.insert("B".to_string(), 1);
        store
            .update_tally(
                "AAAAA",
                TallySnapshot {
                    votes,
                    status: Phase::Closed,
                    timer: 0,
                    voter_origins: vec!["10.0.0.1".to_string()],
                },
            )
            .await
            .unwrap();

        let loaded = store.load_all().await.unwrap();
        let room = &loaded[0];
        assert_eq!(room.options[0].votes, 3);
        assert_eq!(room.options[1].votes, 1);
        assert_eq!(room.status, Phase::Closed);
        assert_eq!(room.voter_origins, vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_update_tally_for_unsaved_room_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let result = store
            .update_tally(
                "NOPE!",
                TallySnapshot {
                    votes: BTreeMap::new(),
                    status: Phase::Active,
                    timer: 10,
                    voter_origins: vec![],
                },
            )
            .await;
        assert!(result.is_ok());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_participants() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.save(&record("AAAAA", Phase::Waiting)).await.unwrap();

        store
            .update_participants(
                "AAAAA",
                vec![ParticipantRecord {
                    user_id: "u-2".to_string(),
                    username: "bob".to_string(),
                    voted: true,
                }],
            )
            .await
            .unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded[0].participants.len(), 1);
        assert_eq!(loaded[0].participants[0].username, "bob");
        assert!(loaded[0].participants[0].voted);
    }
}
