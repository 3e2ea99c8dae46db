use std::time::Duration;

use bytes::BytesMut;
use relaylink_proto::{
    AuthRequest, Frame, new_receive_buffer, read_frame, write_frame, write_line_json,
};
use relaylink_server::RelayState;
use relaylink_server::config::RelayConfig;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Debug, Deserialize)]
struct AuthResponseDto {
    success: bool,
    room_code: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationDto {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct PongDto {
    #[serde(rename = "type")]
    kind: String,
    timestamp: i64,
}

struct TestPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    buf: BytesMut,
}

impl TestPeer {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to relay");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            buf: new_receive_buffer(),
        }
    }

    async fn auth(&mut self, role: &str, room_code: &str) -> AuthResponseDto {
        let request = AuthRequest {
            kind: "auth".to_owned(),
            role: role.to_owned(),
            room_code: room_code.to_owned(),
        };
        write_line_json(&mut self.writer, &request)
            .await
            .expect("write auth request");

        let mut line = String::new();
        timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .expect("auth response timed out")
            .expect("read auth response line");
        serde_json::from_str(line.trim_end()).expect("parse auth response")
    }

    async fn send_frame(&mut self, body: &[u8]) {
        write_frame(&mut self.writer, body)
            .await
            .expect("write frame");
    }

    async fn recv_frame(&mut self, wait: Duration) -> Frame {
        timeout(wait, read_frame(&mut self.reader, &mut self.buf))
            .await
            .expect("frame timed out")
            .expect("read frame")
    }

    async fn try_recv_frame(&mut self, wait: Duration) -> Option<Frame> {
        timeout(wait, read_frame(&mut self.reader, &mut self.buf))
            .await
            .ok()
            .and_then(|result| result.ok())
    }

    async fn recv_notification(&mut self, wait: Duration) -> NotificationDto {
        let frame = self.recv_frame(wait).await;
        let dto: NotificationDto =
            serde_json::from_slice(frame.body()).expect("parse notification");
        assert_eq!(dto.kind, "notification");
        dto
    }

    async fn expect_closed(&mut self, wait: Duration) {
        let mut scratch = [0_u8; 16];
        let result = timeout(
            wait,
            tokio::io::AsyncReadExt::read(&mut self.reader, &mut scratch),
        )
        .await
        .expect("connection was not closed within the deadline");
        assert_eq!(result.expect("read after close"), 0, "expected EOF");
    }
}

async fn start_relay() -> (std::net::SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral relay socket");
    let addr = listener.local_addr().expect("relay local addr");
    let state = RelayState::new();
    let handle = tokio::spawn(async move {
        let _ = relaylink_server::serve(listener, state).await;
    });
    (addr, handle)
}

async fn start_relay_with_gc(
    config: RelayConfig,
) -> (std::net::SocketAddr, JoinHandle<()>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral relay socket");
    let addr = listener.local_addr().expect("relay local addr");
    let state = RelayState::new();
    let serve_handle = tokio::spawn({
        let state = state.clone();
        async move {
            let _ = relaylink_server::serve(listener, state).await;
        }
    });
    let gc_handle = tokio::spawn(relaylink_server::run_gc_task(state, config));
    (addr, serve_handle, gc_handle)
}

#[tokio::test]
async fn controller_and_client_pair_with_notification() {
    let (addr, server) = start_relay().await;

    let mut controller = TestPeer::connect(addr).await;
    let auth = controller.auth("controller", "").await;
    assert!(auth.success);
    let room_code = auth.room_code.expect("room code on success");
    assert_eq!(room_code.len(), 6);

    let mut client = TestPeer::connect(addr).await;
    let auth = client.auth("client", &room_code).await;
    assert!(auth.success);
    assert_eq!(auth.room_code.as_deref(), Some(room_code.as_str()));

    let notification = controller.recv_notification(Duration::from_secs(2)).await;
    assert_eq!(notification.message, "Client connected");

    server.abort();
}

#[tokio::test]
async fn frame_is_relayed_byte_for_byte() {
    let (addr, server) = start_relay().await;

    let mut controller = TestPeer::connect(addr).await;
    let auth = controller.auth("controller", "").await;
    let room_code = auth.room_code.unwrap();

    let mut client = TestPeer::connect(addr).await;
    client.auth("client", &room_code).await;
    controller.recv_notification(Duration::from_secs(2)).await;

    let body = br#"{"type":"text","payload":"hello from client"}"#;
    let mut expected = Vec::new();
    write_frame(&mut expected, body).await.unwrap();

    client.send_frame(body).await;

    let frame = controller.recv_frame(Duration::from_secs(2)).await;
    assert_eq!(frame.body(), body);
    assert_eq!(frame.as_bytes(), expected.as_slice());

    server.abort();
}

#[tokio::test]
async fn ping_is_answered_locally_with_a_positive_timestamp() {
    let (addr, server) = start_relay().await;

    let mut controller = TestPeer::connect(addr).await;
    controller.auth("controller", "").await;

    controller.send_frame(br#"{"type":"ping"}"#).await;
    let frame = controller.recv_frame(Duration::from_secs(2)).await;
    let pong: PongDto = serde_json::from_slice(frame.body()).expect("parse pong");
    assert_eq!(pong.kind, "pong");
    assert!(pong.timestamp > 0);

    server.abort();
}

#[tokio::test]
async fn controller_rejoin_sends_exactly_one_notification_and_keeps_the_room() {
    let (addr, server) = start_relay().await;

    let mut controller_a = TestPeer::connect(addr).await;
    let auth = controller_a.auth("controller", "").await;
    let room_code = auth.room_code.unwrap();

    let mut client = TestPeer::connect(addr).await;
    client.auth("client", &room_code).await;
    controller_a
        .recv_notification(Duration::from_secs(2))
        .await;

    let mut controller_b = TestPeer::connect(addr).await;
    let auth = controller_b.auth("controller", &room_code).await;
    assert!(auth.success);
    assert_eq!(auth.room_code.as_deref(), Some(room_code.as_str()));

    let notification = client.recv_notification(Duration::from_secs(2)).await;
    assert_eq!(notification.message, "Controller reconnected");
    // Exactly one: nothing further shows up even after giving the evicted
    // controller's own disconnect cleanup time to run.
    assert!(
        client
            .try_recv_frame(Duration::from_millis(300))
            .await
            .is_none()
    );

    controller_a
        .expect_closed(Duration::from_secs(2))
        .await;

    let body = br#"{"type":"text","payload":"still paired"}"#;
    controller_b.send_frame(body).await;
    let frame = client.recv_frame(Duration::from_secs(2)).await;
    assert_eq!(frame.body(), body);

    server.abort();
}

#[tokio::test]
async fn duplicate_client_is_rejected_and_existing_pair_is_unaffected() {
    let (addr, server) = start_relay().await;

    let mut controller = TestPeer::connect(addr).await;
    let auth = controller.auth("controller", "").await;
    let room_code = auth.room_code.unwrap();

    let mut client = TestPeer::connect(addr).await;
    client.auth("client", &room_code).await;
    controller.recv_notification(Duration::from_secs(2)).await;

    let mut second_client = TestPeer::connect(addr).await;
    let auth = second_client.auth("client", &room_code).await;
    assert!(!auth.success);
    assert_eq!(
        auth.error.as_deref(),
        Some(format!("room {room_code} already has a client").as_str())
    );

    let body = br#"{"type":"text","payload":"unaffected"}"#;
    controller.send_frame(body).await;
    let frame = client.recv_frame(Duration::from_secs(2)).await;
    assert_eq!(frame.body(), body);

    server.abort();
}

#[tokio::test]
async fn oversized_frame_closes_the_offending_peer_and_notifies_the_survivor() {
    let (addr, server) = start_relay().await;

    let mut controller = TestPeer::connect(addr).await;
    let auth = controller.auth("controller", "").await;
    let room_code = auth.room_code.unwrap();

    let mut client = TestPeer::connect(addr).await;
    client.auth("client", &room_code).await;
    controller.recv_notification(Duration::from_secs(2)).await;

    let oversized_len = (relaylink_proto::RECEIVE_BUFFER_BYTES as u32).to_be_bytes();
    client
        .writer
        .write_all(&oversized_len)
        .await
        .expect("write oversized length prefix");

    let notification = controller.recv_notification(Duration::from_secs(2)).await;
    assert_eq!(notification.message, "Client disconnected");

    client.expect_closed(Duration::from_secs(2)).await;

    server.abort();
}

#[tokio::test]
async fn controller_disconnect_then_a_later_reconnect_keeps_the_room() {
    let (addr, server) = start_relay().await;

    let mut controller = TestPeer::connect(addr).await;
    let auth = controller.auth("controller", "").await;
    let room_code = auth.room_code.unwrap();

    let mut client = TestPeer::connect(addr).await;
    client.auth("client", &room_code).await;
    controller.recv_notification(Duration::from_secs(2)).await;

    drop(controller);

    let notification = client.recv_notification(Duration::from_secs(2)).await;
    assert_eq!(
        notification.message,
        "Controller disconnected, waiting for reconnection"
    );

    let mut controller_b = TestPeer::connect(addr).await;
    let auth = controller_b.auth("controller", &room_code).await;
    assert!(auth.success);
    assert_eq!(auth.room_code.as_deref(), Some(room_code.as_str()));

    let notification = client.recv_notification(Duration::from_secs(2)).await;
    assert_eq!(notification.message, "Controller reconnected");

    server.abort();
}

#[tokio::test]
async fn stale_controller_only_room_is_garbage_collected() {
    let config = RelayConfig {
        bind_address: String::new(),
        stale_room_after: Duration::from_millis(150),
        gc_interval: Duration::from_millis(50),
        stats_interval: Duration::from_secs(3600),
    };
    let (addr, server, gc) = start_relay_with_gc(config).await;

    let mut controller = TestPeer::connect(addr).await;
    let auth = controller.auth("controller", "").await;
    let room_code = auth.room_code.unwrap();

    controller.expect_closed(Duration::from_secs(2)).await;

    let mut late_client = TestPeer::connect(addr).await;
    let auth = late_client.auth("client", &room_code).await;
    assert!(!auth.success);
    assert_eq!(
        auth.error.as_deref(),
        Some(format!("room {room_code} not found").as_str())
    );

    server.abort();
    gc.abort();
}

#[tokio::test]
async fn room_with_attached_client_survives_gc_regardless_of_age() {
    let config = RelayConfig {
        bind_address: String::new(),
        stale_room_after: Duration::from_millis(150),
        gc_interval: Duration::from_millis(50),
        stats_interval: Duration::from_secs(3600),
    };
    let (addr, server, gc) = start_relay_with_gc(config).await;

    let mut controller = TestPeer::connect(addr).await;
    let auth = controller.auth("controller", "").await;
    let room_code = auth.room_code.unwrap();

    let mut client = TestPeer::connect(addr).await;
    client.auth("client", &room_code).await;
    controller.recv_notification(Duration::from_secs(2)).await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    let body = br#"{"type":"text","payload":"still here after the gc window"}"#;
    controller.send_frame(body).await;
    let frame = client.recv_frame(Duration::from_secs(2)).await;
    assert_eq!(frame.body(), body);

    server.abort();
    gc.abort();
}
