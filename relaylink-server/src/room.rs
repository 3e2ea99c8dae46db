use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::peer::Peer;

// Mutating a slot requires the global lock to have been acquired first (global, then
// room, never reversed); nothing in this module reaches back out to the global lock.
#[derive(Default)]
pub struct RoomSlots {
    pub controller: Option<Arc<Peer>>,
    pub client: Option<Arc<Peer>>,
}

pub struct Room {
    pub code: String,
    pub created_at: Instant,
    pub slots: RwLock<RoomSlots>,
}

impl Room {
    pub fn new(code: String) -> Self {
        Self {
            code,
            created_at: Instant::now(),
            slots: RwLock::new(RoomSlots::default()),
        }
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
