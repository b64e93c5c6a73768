use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::relay::registry::HubRegistry;

/// Spawn the periodic liveness sweep. Heartbeats are the primary
/// dead-connection detector (transport close frames are only a secondary
/// path), so this task is what guarantees silent sockets are eventually
/// evicted and their `user_left` broadcast.
pub fn spawn_sweep(registry: Arc<HubRegistry>, config: &Config) -> JoinHandle<()> {
    let sweep_interval = config.sweep_interval();
    let idle_after = config.idle_threshold();
    let offline_after = config.offline_threshold();
    let grace = config.presence_grace();

    info!(
        "Liveness sweep every {:?} (idle after {:?}, offline after {:?}, grace {:?})",
        sweep_interval, idle_after, offline_after, grace
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            for hub in registry.all().await {
                let stats = hub.sweep(idle_after, offline_after, grace).await;
                if stats.evicted > 0 || stats.expired > 0 {
                    info!(
                        "Sweep of workspace {}: {} idle, {} evicted, {} expired",
                        hub.workspace_id, stats.marked_idle, stats.evicted, stats.expired
                    );
                } else if stats.marked_idle > 0 {
                    debug!(
                        "Sweep of workspace {}: {} marked idle",
                        hub.workspace_id, stats.marked_idle
                    );
                }
                if hub.is_empty().await {
                    registry.remove_if_empty(&hub.workspace_id).await;
                }
            }
        }
    })
}
