use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::relay::hub::WorkspaceHub;

/// Table of active workspace hubs. Hubs are created lazily on first
/// connection and dropped by the sweep once empty. The registry lock only
/// guards the table itself; all workspace state lives behind each hub's own
/// mutex, so traffic in one workspace never blocks another.
#[derive(Debug)]
pub struct HubRegistry {
    hubs: RwLock<HashMap<String, Arc<WorkspaceHub>>>,
    queue_capacity: usize,
}

impl HubRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            hubs: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Get the hub for a workspace, creating it on first use
    pub async fn hub(&self, workspace_id: &str) -> Arc<WorkspaceHub> {
        {
            let hubs = self.hubs.read().await;
            if let Some(hub) = hubs.get(workspace_id) {
                return hub.clone();
            }
        }
        let mut hubs = self.hubs.write().await;
        hubs.entry(workspace_id.to_string())
            .or_insert_with(|| {
                info!("Creating hub for workspace {}", workspace_id);
                Arc::new(WorkspaceHub::new(workspace_id, self.queue_capacity))
            })
            .clone()
    }

    /// Get the hub for a workspace without creating it
    pub async fn get(&self, workspace_id: &str) -> Option<Arc<WorkspaceHub>> {
        self.hubs.read().await.get(workspace_id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<WorkspaceHub>> {
        self.hubs.read().await.values().cloned().collect()
    }

    pub async fn workspace_count(&self) -> usize {
        self.hubs.read().await.len()
    }

    /// Drop a hub if it holds no sessions and no presence entries. Re-checks
    /// under the write lock so a connection racing in is never lost.
    pub async fn remove_if_empty(&self, workspace_id: &str) {
        let hub = {
            let hubs = self.hubs.read().await;
            match hubs.get(workspace_id) {
                Some(hub) => hub.clone(),
                None => return,
            }
        };
        if !hub.is_empty().await {
            return;
        }
        let mut hubs = self.hubs.write().await;
        if let Some(hub) = hubs.get(workspace_id) {
            if hub.is_empty().await {
                hubs.remove(workspace_id);
                debug!("Removed empty hub for workspace {}", workspace_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn hubs_are_created_lazily_and_shared() {
        let registry = HubRegistry::new(100);
        let first = registry.hub("7").await;
        let again = registry.hub("7").await;
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.workspace_count().await, 1);
    }

    #[tokio::test]
    async fn workspaces_are_isolated() {
        let registry = HubRegistry::new(100);
        let w1 = registry.hub("w1").await;
        let w2 = registry.hub("w2").await;

        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        w1.connect("alice", "alice", tx_a).await;
        w2.connect("bob", "bob", tx_b).await;

        w1.update_activity("alice", "editing".to_string(), None).await;

        // Nothing from w1 leaks into w2
        assert!(rx_b.try_recv().is_err());
        assert_eq!(w1.snapshot().await.len(), 1);
        assert_eq!(w2.snapshot().await.len(), 1);
        assert!(w2.snapshot().await[0].current_activity.is_none());
    }

    #[tokio::test]
    async fn empty_hubs_are_removed_but_active_ones_survive() {
        let registry = HubRegistry::new(100);
        let hub = registry.hub("7").await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let admission = hub.connect("alice", "alice", tx).await;

        registry.remove_if_empty("7").await;
        assert_eq!(registry.workspace_count().await, 1);

        hub.disconnect("alice", admission.session.session_id).await;
        // Presence entry still inside the grace window keeps the hub alive
        registry.remove_if_empty("7").await;
        assert_eq!(registry.workspace_count().await, 1);

        // Once the grace window lapses the sweep clears presence and the hub goes
        hub.force_disconnected_at("alice", chrono::Utc::now() - chrono::Duration::seconds(600))
            .await;
        hub.sweep(
            std::time::Duration::from_secs(45),
            std::time::Duration::from_secs(90),
            std::time::Duration::from_secs(60),
        )
        .await;
        registry.remove_if_empty("7").await;
        assert_eq!(registry.workspace_count().await, 0);
    }
}
