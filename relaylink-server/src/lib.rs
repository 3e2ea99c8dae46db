pub mod config;
mod errors;
mod handshake;
mod lifecycle;
mod peer;
mod relay;
mod room;
mod state;

pub use errors::RelayError;
pub use lifecycle::{run_gc_task, run_stats_task};
pub use state::RelayState;

use std::sync::Arc;

use relaylink_proto::Notification;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::peer::{ConnectionId, next_connection_id, split_stream};

pub async fn serve(listener: TcpListener, state: Arc<RelayState>) -> std::io::Result<()> {
    info!(
        local_addr = %listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_owned()),
        "relay listening"
    );

    loop {
        let (stream, addr) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            let connection_id = next_connection_id();
            if let Err(err) = stream.set_nodelay(true) {
                warn!(connection_id, error = %err, "failed to set TCP_NODELAY");
            }
            info!(connection_id, %addr, "connection accepted");
            handle_connection(state, stream, connection_id).await;
            info!(connection_id, "connection closed");
        });
    }
}

async fn handle_connection(state: Arc<RelayState>, stream: TcpStream, connection_id: ConnectionId) {
    let (mut reader, write_half) = split_stream(stream);

    let Some(outcome) =
        handshake::perform_handshake(&state, &mut reader, write_half, connection_id).await
    else {
        return;
    };

    if let Some((target, message)) = outcome.notify {
        if let Err(err) = target.send_json(&Notification::new(message)).await {
            warn!(
                connection_id = target.connection_id,
                error = %err,
                "failed to deliver join notification"
            );
        }
    }

    relay::run_relay_loop(&outcome.peer, &outcome.room, &mut reader).await;
    lifecycle::handle_disconnect(&state, connection_id).await;
}
