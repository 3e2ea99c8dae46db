use std::sync::Arc;
use std::time::Duration;

use relaylink_proto::{
    AuthRequest, AuthResponse, NOTIFICATION_CLIENT_CONNECTED, NOTIFICATION_CONTROLLER_RECONNECTED,
    Role, normalize_room_code, write_line_json,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::warn;

use crate::peer::{ConnectionId, Peer};
use crate::room::Room;
use crate::state::{ClientJoinError, RelayState};

pub const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HandshakeOutcome {
    pub peer: Arc<Peer>,
    pub room: Arc<Room>,
    pub notify: Option<(Arc<Peer>, &'static str)>,
}

pub async fn perform_handshake(
    state: &Arc<RelayState>,
    reader: &mut BufReader<OwnedReadHalf>,
    mut write_half: OwnedWriteHalf,
    connection_id: ConnectionId,
) -> Option<HandshakeOutcome> {
    let mut line = String::new();
    let read_result = timeout(AUTH_TIMEOUT, reader.read_line(&mut line)).await;

    let bytes_read = match read_result {
        Ok(Ok(n)) => n,
        Ok(Err(err)) => {
            warn!(connection_id, error = %err, "auth read failed");
            return None;
        }
        Err(_) => {
            warn!(connection_id, "auth message did not arrive within the timeout");
            return None;
        }
    };
    if bytes_read == 0 {
        return None;
    }

    let request: AuthRequest = match serde_json::from_str(line.trim_end()) {
        Ok(request) => request,
        Err(_) => {
            reject(&mut write_half, "Invalid auth message format").await;
            return None;
        }
    };

    if request.kind != "auth" {
        reject(&mut write_half, "Expected auth message").await;
        return None;
    }

    let role = match request.role.as_str() {
        "controller" => Role::Controller,
        "client" => Role::Client,
        _ => {
            reject(
                &mut write_half,
                "Invalid role, expected 'controller' or 'client'",
            )
            .await;
            return None;
        }
    };

    let normalized_code = normalize_room_code(&request.room_code);

    match role {
        Role::Controller => {
            let requested = if normalized_code.is_empty() {
                None
            } else {
                Some(normalized_code)
            };
            let peer = Arc::new(Peer::new(connection_id, role, write_half));
            let outcome = state.controller_join(peer.clone(), requested).await;

            if let Err(err) = peer
                .send_auth_response(&AuthResponse::success(outcome.room.code.clone()))
                .await
            {
                warn!(connection_id, error = %err, "failed to write auth success");
            }

            if let Some(evicted) = &outcome.evicted_controller {
                evicted.request_close();
            }

            let notify = outcome
                .rejoined
                .then_some(())
                .and_then(|()| outcome.client_to_notify.clone())
                .map(|client| (client, NOTIFICATION_CONTROLLER_RECONNECTED));

            Some(HandshakeOutcome {
                peer,
                room: outcome.room,
                notify,
            })
        }
        Role::Client => {
            if normalized_code.is_empty() {
                reject(&mut write_half, "Room code required for client").await;
                return None;
            }

            let peer = Arc::new(Peer::new(connection_id, role, write_half));
            match state.client_join(peer.clone(), normalized_code.clone()).await {
                Ok(outcome) => {
                    if let Err(err) = peer
                        .send_auth_response(&AuthResponse::success(outcome.room.code.clone()))
                        .await
                    {
                        warn!(connection_id, error = %err, "failed to write auth success");
                    }

                    let notify = outcome
                        .controller
                        .map(|controller| (controller, NOTIFICATION_CLIENT_CONNECTED));

                    Some(HandshakeOutcome {
                        peer,
                        room: outcome.room,
                        notify,
                    })
                }
                Err(err) => {
                    let message = match err {
                        ClientJoinError::RoomCodeRequired => {
                            "Room code required for client".to_owned()
                        }
                        ClientJoinError::RoomNotFound(code) => format!("room {code} not found"),
                        ClientJoinError::RoomAlreadyHasClient(code) => {
                            format!("room {code} already has a client")
                        }
                    };
                    // The peer was never registered by `client_join`, so it just goes
                    // out of scope; the response is written through it for the shared
                    // write-serialization path rather than the raw half.
                    if let Err(send_err) =
                        peer.send_auth_response(&AuthResponse::failure(message)).await
                    {
                        warn!(connection_id, error = %send_err, "failed to write auth rejection");
                    }
                    None
                }
            }
        }
    }
}

async fn reject(write_half: &mut OwnedWriteHalf, message: &str) {
    let response = AuthResponse::failure(message);
    if let Err(err) = write_line_json(write_half, &response).await {
        warn!(error = %err, "failed to write auth rejection");
    }
}
