use std::sync::Arc;

use relaylink_proto::Notification;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::peer::ConnectionId;
use crate::state::RelayState;

pub async fn handle_disconnect(state: &Arc<RelayState>, connection_id: ConnectionId) {
    if let Some((message, survivor)) = state.remove_peer(connection_id).await {
        if let Err(err) = survivor.send_json(&Notification::new(message)).await {
            warn!(
                connection_id = survivor.connection_id,
                error = %err,
                "failed to deliver disconnect notification"
            );
        }
    }
}

pub async fn run_gc_task(state: Arc<RelayState>, config: RelayConfig) {
    let mut ticker = interval(config.gc_interval);
    loop {
        ticker.tick().await;
        let report = state.run_garbage_collection(config.stale_room_after).await;
        info!(
            removed = report.removed_rooms,
            retained = report.retained_rooms,
            "stale-room sweep"
        );
        for controller in report.evicted_controllers {
            controller.request_close();
        }
    }
}

pub async fn run_stats_task(state: Arc<RelayState>, config: RelayConfig) {
    let mut ticker = interval(config.stats_interval);
    loop {
        ticker.tick().await;
        let stats = state.stats().await;
        info!(
            total_rooms = stats.total_rooms,
            active_pairs = stats.active_pairs,
            total_connections = stats.total_connections,
            "relay stats"
        );
    }
}
