//! Per-room countdown driving the `active -> closed` transition.

use super::{room_public_state, AppState};
use crate::protocol::ServerMessage;
use crate::types::{Phase, Room};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

impl AppState {
    /// Arm the one-second countdown for a room. Must be called with the
    /// room's lock held; any previous countdown for the room is cancelled
    /// first, so a room has at most one live countdown at any instant.
    ///
    /// Each tick decrements `remaining_seconds` and broadcasts; the tick
    /// that reaches zero also flips the phase to `closed` and disarms the
    /// task permanently. A room that has vanished disarms silently.
    pub fn arm_countdown(self: &Arc<Self>, room: &mut Room) {
        if let Some(previous) = room.countdown.take() {
            previous.abort();
        }

        let state = Arc::clone(self);
        let code = room.code.clone();
        room.countdown = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;

                let Some(room) = state.get_room(&code).await else {
                    return;
                };
                let (snapshot, closed) = {
                    let mut room = room.lock().await;
                    if room.phase != Phase::Active {
                        room.countdown = None;
                        return;
                    }
                    if room.remaining_seconds > 0 {
                        room.remaining_seconds -= 1;
                    }
                    let closed = room.remaining_seconds == 0;
                    if closed {
                        room.phase = Phase::Closed;
                        room.countdown = None;
                        state.schedule_update_tally(&room);
                        tracing::info!(room = %room.code, "poll closed");
                    }
                    (room_public_state(&room, None), closed)
                };

                state
                    .registry
                    .broadcast(&code, ServerMessage::RoomUpdate(snapshot))
                    .await;

                if closed {
                    return;
                }
            }
        }));
    }
}
