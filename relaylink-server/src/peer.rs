use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use relaylink_proto::{CodecError, Role, write_json_message, write_line_json, write_raw_frame};
use serde::Serialize;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Notify};

pub type ConnectionId = u64;

// `room_code` is empty until the peer is bound into a room's slot, then set exactly
// once. `write_lock` serializes a pong, a lifecycle notification, and a forwarded frame
// so none of them interleave on the wire.
pub struct Peer {
    pub connection_id: ConnectionId,
    pub role: Role,
    room_code: OnceLock<String>,
    write_lock: Mutex<OwnedWriteHalf>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl Peer {
    pub fn new(connection_id: ConnectionId, role: Role, write_half: OwnedWriteHalf) -> Self {
        Self {
            connection_id,
            role,
            room_code: OnceLock::new(),
            write_lock: Mutex::new(write_half),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        }
    }

    pub fn bind_room_code(&self, code: String) {
        let _ = self.room_code.set(code);
    }

    pub fn room_code(&self) -> &str {
        self.room_code.get().map(String::as_str).unwrap_or("")
    }

    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), CodecError> {
        let mut guard = self.write_lock.lock().await;
        write_json_message(&mut *guard, value).await
    }

    // Newline-terminated, unlike everything sent through `send_json`/`send_raw` — used
    // only for the auth handshake reply.
    pub async fn send_auth_response<T: Serialize>(&self, value: &T) -> Result<(), CodecError> {
        let mut guard = self.write_lock.lock().await;
        write_line_json(&mut *guard, value).await
    }

    pub async fn send_raw(&self, frame: &relaylink_proto::Frame) -> Result<(), CodecError> {
        let mut guard = self.write_lock.lock().await;
        write_raw_frame(&mut *guard, frame).await
    }

    // Idempotent: only the first caller across any number of concurrent callers (rejoin
    // eviction, disconnect cleanup, stale-room GC) performs the transition and wakes the
    // owning relay loop.
    pub fn request_close(&self) -> bool {
        let transitioned = self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if transitioned {
            self.close_signal.notify_waiters();
        }
        transitioned
    }

    // The `Notified` future is created before the flag is checked: `notify_waiters` only
    // wakes futures that already exist at the time it's called, so checking the flag
    // first would leave a window where a close racing in right after goes unobserved.
    pub async fn closed(&self) {
        let notified = self.close_signal.notified();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

pub fn split_stream(stream: TcpStream) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let (read_half, write_half) = stream.into_split();
    (BufReader::new(read_half), write_half)
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}
