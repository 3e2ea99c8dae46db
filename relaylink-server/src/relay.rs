use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use relaylink_proto::{
    CodecError, FrameHeader, MESSAGE_TYPE_PING, Pong, new_receive_buffer, read_frame,
};
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, warn};

use crate::peer::Peer;
use crate::room::Room;

pub async fn run_relay_loop(peer: &Arc<Peer>, room: &Arc<Room>, reader: &mut BufReader<OwnedReadHalf>) {
    let mut buf = new_receive_buffer();

    loop {
        tokio::select! {
            biased;
            () = peer.closed() => {
                debug!(connection_id = peer.connection_id, "peer closed externally, ending relay loop");
                return;
            }
            result = read_frame(reader, &mut buf) => {
                match result {
                    Ok(frame) => {
                        if FrameHeader::peek(frame.body()).as_deref() == Some(MESSAGE_TYPE_PING) {
                            if let Err(err) = peer.send_json(&Pong::now(now_millis())).await {
                                warn!(connection_id = peer.connection_id, error = %err, "failed to write pong");
                                return;
                            }
                            continue;
                        }

                        let target = counterpart(peer, room).await;
                        if let Some(target) = target {
                            if let Err(err) = target.send_raw(&frame).await {
                                warn!(
                                    connection_id = target.connection_id,
                                    error = %err,
                                    "failed to forward frame, closing counterpart"
                                );
                                target.request_close();
                            }
                        }
                    }
                    Err(CodecError::Eof) => {
                        debug!(connection_id = peer.connection_id, "connection closed by peer");
                        return;
                    }
                    Err(CodecError::FrameTooLarge { declared, max }) => {
                        warn!(
                            connection_id = peer.connection_id,
                            declared, max, "oversized frame, closing connection"
                        );
                        return;
                    }
                    Err(err) => {
                        warn!(connection_id = peer.connection_id, error = %err, "read error, closing connection");
                        return;
                    }
                }
            }
        }
    }
}

async fn counterpart(peer: &Arc<Peer>, room: &Arc<Room>) -> Option<Arc<Peer>> {
    let slots = room.slots.read().await;
    match peer.role {
        relaylink_proto::Role::Controller => slots.client.clone(),
        relaylink_proto::Role::Client => slots.controller.clone(),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
