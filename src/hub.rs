//! The room registry for one channel (zoom, chat, or screenshare).
//!
//! Grounded on the teacher's `Rooms = Arc<RwLock<HashMap<String, Users>>>`
//! pattern (`user.rs`), generalized from a flat user map to a handle onto a
//! dedicated room task. A `RoomHandle` carries a generation counter so a
//! room that has just been reaped can't be confused with a same-named room
//! created immediately afterward.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use warp::ws::Message;

use crate::auth::ClientInfo;
use crate::room::{self, RoomCommand};

#[derive(Clone)]
struct RoomHandle {
    generation: u64,
    tx: mpsc::Sender<RoomCommand>,
}

/// One registry per logical channel; `server.rs` constructs three.
pub struct Hub {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    next_generation: AtomicU64,
}

impl Hub {
    pub fn new() -> Arc<Hub> {
        Arc::new(Hub {
            rooms: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        })
    }

    /// Looks up the live room for `room_id`, spawning a fresh one if none
    /// exists. `self` must already be wrapped in an `Arc` since the
    /// spawned room task holds a clone of it to call back into `reap`.
    /// Generations are drawn from a hub-wide counter, not scoped to
    /// `room_id`, so a room reaped and immediately recreated under the same
    /// id never collides with the generation `reap` was called with.
    async fn room_tx(self: &Arc<Self>, room_id: &str) -> mpsc::Sender<RoomCommand> {
        if let Some(handle) = self.rooms.read().await.get(room_id) {
            return handle.tx.clone();
        }

        let mut rooms = self.rooms.write().await;
        if let Some(handle) = rooms.get(room_id) {
            return handle.tx.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tx = room::spawn_room(room_id.to_string(), generation, Arc::clone(self));
        rooms.insert(
            room_id.to_string(),
            RoomHandle {
                generation,
                tx: tx.clone(),
            },
        );
        tx
    }

    /// Removes the registry entry for `room_id` iff it still points at the
    /// room instance identified by `generation` (a newer room may already
    /// have replaced it by the time the empty check runs).
    pub async fn reap(&self, room_id: &str, generation: u64) {
        let mut rooms = self.rooms.write().await;
        if let Some(handle) = rooms.get(room_id) {
            if handle.generation == generation {
                rooms.remove(room_id);
                tracing::debug!(room = %room_id, generation, "room reaped");
            }
        }
    }

    /// Registers a newly authenticated connection with its room, spawning
    /// the room if this is the first connection to it. Returns the sender
    /// used by the connection's reader pump to submit further events.
    pub async fn register(
        self: &Arc<Self>,
        room_id: &str,
        info: ClientInfo,
        client_tx: mpsc::Sender<Message>,
    ) -> mpsc::Sender<RoomCommand> {
        let room_tx = self.room_tx(room_id).await;
        let _ = room_tx
            .send(RoomCommand::Register {
                info,
                tx: client_tx,
            })
            .await;
        room_tx
    }

    /// Broadcasts a shutdown instruction to every live room and waits for
    /// the registry to drain, used by the top-level graceful-shutdown path.
    pub async fn shutdown_all(&self) {
        let handles: Vec<mpsc::Sender<RoomCommand>> = self
            .rooms
            .read()
            .await
            .values()
            .map(|h| h.tx.clone())
            .collect();
        for tx in handles {
            let _ = tx.send(RoomCommand::Shutdown).await;
        }
    }

    #[cfg(test)]
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ClientInfo;

    fn info(id: &str) -> ClientInfo {
        ClientInfo {
            client_id: id.to_string(),
            display_name: id.to_string(),
        }
    }

    #[tokio::test]
    async fn register_creates_room_on_first_connection() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::channel(4);
        hub.register("R1", info("A"), tx).await;
        assert_eq!(hub.room_count().await, 1);
    }

    #[tokio::test]
    async fn second_registration_reuses_existing_room() {
        let hub = Hub::new();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, _rx_b) = mpsc::channel(4);
        hub.register("R1", info("A"), tx_a).await;
        hub.register("R1", info("B"), tx_b).await;
        assert_eq!(hub.room_count().await, 1);
    }

    #[tokio::test]
    async fn reap_with_stale_generation_is_a_no_op() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::channel(4);
        hub.register("R1", info("A"), tx).await;
        hub.reap("R1", 999).await;
        assert_eq!(hub.room_count().await, 1);
    }

    #[tokio::test]
    async fn unregister_of_last_client_eventually_reaps_room() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::channel(4);
        let room_tx = hub.register("R1", info("A"), tx).await;
        room_tx
            .send(RoomCommand::Unregister {
                client_id: "A".into(),
            })
            .await
            .unwrap();

        // The room task processes the unregister and reaps asynchronously;
        // give it a chance to run.
        for _ in 0..50 {
            if hub.room_count().await == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(hub.room_count().await, 0);
    }
}
