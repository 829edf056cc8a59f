//! Background upkeep: stale-room reclamation and status reporting.
//!
//! Both tasks tick on a fixed interval. A tick that fires late is skipped
//! rather than replayed, so a stalled runtime never produces a burst of
//! sweeps.

use std::sync::Arc;
use std::time::Duration;

use republic_protocol::RoomCode;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::RelayConfig;
use crate::server::ServerState;

/// Keeps the maintenance tasks running. Dropping it stops them.
pub(crate) struct MaintenanceHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Starts the reclamation and status tasks for `state`.
pub(crate) fn spawn_maintenance(
    state: Arc<ServerState>,
    config: &RelayConfig,
) -> MaintenanceHandle {
    let reclaim = {
        let state = Arc::clone(&state);
        let mut ticks = ticker(config.reclaim_interval);
        let stale_after = config.stale_after;
        tokio::spawn(async move {
            loop {
                ticks.tick().await;
                reclaim_stale_rooms(&state, stale_after).await;
            }
        })
    };

    let status = {
        let mut ticks = ticker(config.status_interval);
        tokio::spawn(async move {
            loop {
                ticks.tick().await;
                report_status(&state).await;
            }
        })
    };

    MaintenanceHandle {
        tasks: vec![reclaim, status],
    }
}

/// An interval whose first tick is one full `period` from now.
fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Removes rooms idle for longer than `stale_after`.
pub(crate) async fn reclaim_stale_rooms(
    state: &ServerState,
    stale_after: Duration,
) -> Vec<RoomCode> {
    let reclaimed = state
        .registry
        .lock()
        .await
        .reclaim_stale(Instant::now(), stale_after);
    if !reclaimed.is_empty() {
        tracing::info!(count = reclaimed.len(), "removed stale rooms");
    }
    reclaimed
}

async fn report_status(state: &ServerState) {
    let registry = state.registry.lock().await;
    let stats = state.stats(&registry);
    drop(registry);
    tracing::info!(
        rooms = stats.active_rooms,
        clients = stats.connected_players,
        total_connections = stats.total_connections,
        games_played = stats.total_games_played,
        "status"
    );
}

#[cfg(test)]
mod tests {
    use republic_protocol::{PlayerId, PlayerInfo};
    use republic_room::{Frame, RoomRegistry, SocketHandle};
    use republic_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;

    fn state_with_room(
        code: &str,
    ) -> (Arc<ServerState>, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = RoomRegistry::default();
        registry
            .create(
                RoomCode::parse(code).unwrap(),
                SocketHandle::new(ConnectionId::new(1), tx),
                PlayerInfo {
                    player_id: PlayerId::new("a"),
                    name: "Alice".into(),
                    color_key: "red".into(),
                    is_host: true,
                    is_ready: true,
                },
            )
            .unwrap();
        (Arc::new(ServerState::new(registry)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_reclaims_stale_room_on_schedule() {
        let (state, _rx) = state_with_room("WXYZ");
        let _handle = spawn_maintenance(Arc::clone(&state), &RelayConfig::default());

        // 3600 s of idleness is not yet stale.
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(state.registry.lock().await.room_count(), 1);

        // The sweep at 3900 s finds it.
        tokio::time::sleep(Duration::from_secs(301)).await;
        let registry = state.registry.lock().await;
        assert_eq!(registry.room_count(), 0);
        assert!(registry.room_of(&PlayerId::new("a")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_keeps_active_room() {
        let (state, _rx) = state_with_room("WXYZ");
        let code = RoomCode::parse("WXYZ").unwrap();
        let _handle = spawn_maintenance(Arc::clone(&state), &RelayConfig::default());

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(1800)).await;
            state.registry.lock().await.touch(&code);
        }

        assert_eq!(state.registry.lock().await.room_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_stops_when_handle_dropped() {
        let (state, _rx) = state_with_room("WXYZ");
        let handle = spawn_maintenance(Arc::clone(&state), &RelayConfig::default());
        drop(handle);

        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;

        assert_eq!(state.registry.lock().await.room_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_stale_rooms_returns_codes() {
        let (state, _rx) = state_with_room("WXYZ");

        tokio::time::advance(Duration::from_secs(3601)).await;
        let reclaimed = reclaim_stale_rooms(&state, Duration::from_secs(3600)).await;

        assert_eq!(reclaimed, [RoomCode::parse("WXYZ").unwrap()]);
    }
}
