//! Connection registry: which live connections are bound to which room.
//!
//! Broadcast fan-out is keyed by room code so the cost of a room update is
//! proportional to the room's size, not to the total connection count.

use crate::protocol::ServerMessage;
use crate::types::{ConnectionId, RoomCode};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

pub type OutboundSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<RoomCode, HashMap<ConnectionId, OutboundSender>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection's outbound channel to a room.
    pub async fn bind(&self, room: &str, connection_id: &str, sender: OutboundSender) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.to_string(), sender);
    }

    /// Release a connection's binding, dropping the room entry when empty.
    pub async fn unbind(&self, room: &str, connection_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(conns) = rooms.get_mut(room) {
            conns.remove(connection_id);
            if conns.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Deliver a message to every connection currently bound to the room.
    ///
    /// Connections whose channel has closed are skipped and pruned, not
    /// retried. Returns the number of successful deliveries.
    pub async fn broadcast(&self, room: &str, msg: ServerMessage) -> usize {
        let senders: Vec<(ConnectionId, OutboundSender)> = {
            let rooms = self.rooms.read().await;
            match rooms.get(room) {
                Some(conns) => conns
                    .iter()
                    .map(|(id, tx)| (id.clone(), tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in senders {
            if tx.send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut rooms = self.rooms.write().await;
            if let Some(conns) = rooms.get_mut(room) {
                for id in dead {
                    conns.remove(&id);
                }
                if conns.is_empty() {
                    rooms.remove(room);
                }
            }
        }

        delivered
    }

    pub async fn connections_in(&self, room: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}
