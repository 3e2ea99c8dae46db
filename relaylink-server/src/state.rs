use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use relaylink_proto::{
    NOTIFICATION_CLIENT_DISCONNECTED, NOTIFICATION_CONTROLLER_DISCONNECTED, Role,
    generate_room_code,
};
use tokio::sync::RwLock;
use tracing::info;

use crate::peer::{ConnectionId, Peer};
use crate::room::Room;

// Both the room table and the connection registry live under this one lock so that
// registering a peer and placing it in a room slot happen as a single critical section
// at the outermost level.
#[derive(Default)]
struct GlobalTables {
    rooms: HashMap<String, Arc<Room>>,
    connections: HashMap<ConnectionId, Arc<Peer>>,
}

pub struct RelayState {
    tables: RwLock<GlobalTables>,
}

pub struct ControllerJoinOutcome {
    pub room: Arc<Room>,
    pub rejoined: bool,
    // The caller (handshake.rs) closes this after releasing all locks.
    pub evicted_controller: Option<Arc<Peer>>,
    // Set only on rejoin, since a brand-new room can't have a client yet. The caller
    // notifies it after releasing all locks.
    pub client_to_notify: Option<Arc<Peer>>,
}

pub struct ClientJoinOutcome {
    pub room: Arc<Room>,
    pub controller: Option<Arc<Peer>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientJoinError {
    RoomCodeRequired,
    RoomNotFound(String),
    RoomAlreadyHasClient(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub total_rooms: usize,
    pub active_pairs: usize,
    pub total_connections: usize,
}

#[derive(Default)]
pub struct GcReport {
    pub removed_rooms: usize,
    pub retained_rooms: usize,
    // Caller closes each of these after the sweep's locks are released.
    pub evicted_controllers: Vec<Arc<Peer>>,
}

impl RelayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: RwLock::new(GlobalTables::default()),
        })
    }

    // Must be called while already holding the global write lock, so the
    // check-and-reserve is atomic.
    fn allocate_unique_code(rooms: &HashMap<String, Arc<Room>>) -> String {
        loop {
            let candidate = generate_room_code();
            if !rooms.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub async fn controller_join(
        &self,
        peer: Arc<Peer>,
        requested_code: Option<String>,
    ) -> ControllerJoinOutcome {
        let mut tables = self.tables.write().await;

        let existing_room = requested_code
            .as_ref()
            .filter(|code| !code.is_empty())
            .and_then(|code| tables.rooms.get(code).cloned());

        let (room, evicted_controller, client_to_notify, rejoined) =
            if let Some(room) = existing_room {
                let (evicted, client) = {
                    let mut slots = room.slots.write().await;
                    let evicted = slots.controller.take();
                    slots.controller = Some(peer.clone());
                    (evicted, slots.client.clone())
                };
                (room, evicted, client, true)
            } else {
                let code = Self::allocate_unique_code(&tables.rooms);
                let room = Arc::new(Room::new(code.clone()));
                tables.rooms.insert(code, room.clone());
                {
                    let mut slots = room.slots.write().await;
                    slots.controller = Some(peer.clone());
                }
                (room, None, None, false)
            };

        peer.bind_room_code(room.code.clone());
        tables.connections.insert(peer.connection_id, peer);

        info!(room_code = %room.code, rejoined, "controller bound to room");

        ControllerJoinOutcome {
            room,
            rejoined,
            evicted_controller,
            client_to_notify,
        }
    }

    pub async fn client_join(
        &self,
        peer: Arc<Peer>,
        requested_code: String,
    ) -> Result<ClientJoinOutcome, ClientJoinError> {
        if requested_code.is_empty() {
            return Err(ClientJoinError::RoomCodeRequired);
        }

        let mut tables = self.tables.write().await;
        let room = tables
            .rooms
            .get(&requested_code)
            .cloned()
            .ok_or_else(|| ClientJoinError::RoomNotFound(requested_code.clone()))?;

        {
            let mut slots = room.slots.write().await;
            if slots.client.is_some() {
                return Err(ClientJoinError::RoomAlreadyHasClient(requested_code));
            }
            slots.client = Some(peer.clone());
        }

        peer.bind_room_code(room.code.clone());
        tables.connections.insert(peer.connection_id, peer);
        let controller = room.slots.read().await.controller.clone();

        info!(room_code = %room.code, "client bound to room");

        Ok(ClientJoinOutcome { room, controller })
    }

    // A room is never removed here even if this empties both slots; a controller's room
    // survives its own disconnect. `Arc::ptr_eq` guards against a peer that already lost
    // a race (evicted by a rejoin, or already dropped by GC) clobbering whatever now
    // occupies its old slot.
    pub async fn remove_peer(&self, connection_id: ConnectionId) -> Option<(&'static str, Arc<Peer>)> {
        let mut tables = self.tables.write().await;
        let peer = tables.connections.remove(&connection_id)?;
        let room_code = peer.room_code();
        if room_code.is_empty() {
            return None;
        }

        let room = tables.rooms.get(room_code).cloned();
        drop(tables);

        let room = room?;
        let mut slots = room.slots.write().await;
        match peer.role {
            Role::Controller => {
                let still_here = slots
                    .controller
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &peer));
                if !still_here {
                    return None;
                }
                slots.controller = None;
                slots
                    .client
                    .clone()
                    .map(|client| (NOTIFICATION_CONTROLLER_DISCONNECTED, client))
            }
            Role::Client => {
                let still_here = slots
                    .client
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &peer));
                if !still_here {
                    return None;
                }
                slots.client = None;
                slots
                    .controller
                    .clone()
                    .map(|controller| (NOTIFICATION_CLIENT_DISCONNECTED, controller))
            }
        }
    }

    // The candidate check happens under a read lock first; each candidate is
    // re-validated under a write lock immediately before removal, so a client that
    // joins between the two passes is never lost.
    pub async fn run_garbage_collection(&self, stale_after: Duration) -> GcReport {
        let candidates: Vec<(String, Arc<Room>)> = {
            let tables = self.tables.read().await;
            let mut found = Vec::new();
            for (code, room) in tables.rooms.iter() {
                let slots = room.slots.read().await;
                if slots.client.is_none() && room.age() > stale_after {
                    found.push((code.clone(), room.clone()));
                }
            }
            found
        };

        let mut report = GcReport::default();
        if !candidates.is_empty() {
            let mut tables = self.tables.write().await;
            for (code, room) in candidates {
                let mut slots = room.slots.write().await;
                if slots.client.is_none() && room.age() > stale_after {
                    if let Some(controller) = slots.controller.take() {
                        report.evicted_controllers.push(controller);
                    }
                    drop(slots);
                    tables.rooms.remove(&code);
                    report.removed_rooms += 1;
                }
            }
            report.retained_rooms = tables.rooms.len();
        } else {
            report.retained_rooms = self.tables.read().await.rooms.len();
        }
        report
    }

    pub async fn stats(&self) -> Stats {
        let tables = self.tables.read().await;
        let mut active_pairs = 0;
        for room in tables.rooms.values() {
            let slots = room.slots.read().await;
            if slots.controller.is_some() && slots.client.is_some() {
                active_pairs += 1;
            }
        }
        Stats {
            total_rooms: tables.rooms.len(),
            active_pairs,
            total_connections: tables.connections.len(),
        }
    }
}
