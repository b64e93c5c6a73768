use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::ServerMessage;
use crate::relay::session::{Outbound, OutboundSender, CLOSE_SUPERSEDED};

/// Outbound channels for user-scoped sockets (`/ws/users/:user_id`), used for
/// cross-workspace notifications. One socket per user; a newer one supersedes.
#[derive(Debug, Default)]
pub struct UserChannels {
    channels: RwLock<HashMap<String, OutboundSender>>,
}

impl UserChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: &str, sender: OutboundSender) {
        let mut channels = self.channels.write().await;
        if let Some(prior) = channels.insert(user_id.to_string(), sender) {
            info!("Superseding notification socket for user {}", user_id);
            let _ = prior.send(Outbound::Close {
                code: CLOSE_SUPERSEDED,
                reason: "superseded by a newer connection",
            });
        }
    }

    /// Remove a user's channel, but only if it is still the given one: a
    /// superseded socket unregistering must not tear down its replacement.
    pub async fn unregister(&self, user_id: &str, sender: &OutboundSender) {
        let mut channels = self.channels.write().await;
        if channels.get(user_id).is_some_and(|current| current.same_channel(sender)) {
            channels.remove(user_id);
        }
    }

    /// Best-effort delivery to a user's notification socket
    pub async fn notify(&self, user_id: &str, message: ServerMessage) -> bool {
        let channels = self.channels.read().await;
        match channels.get(user_id) {
            Some(sender) => sender.send(Outbound::Message(message)).is_ok(),
            None => {
                debug!("No notification socket open for user {}", user_id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn newer_socket_supersedes_and_stale_unregister_is_ignored() {
        let channels = UserChannels::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        channels.register("alice", tx1.clone()).await;
        channels.register("alice", tx2).await;

        assert!(matches!(
            rx1.try_recv(),
            Ok(Outbound::Close { code: CLOSE_SUPERSEDED, .. })
        ));

        // The superseded socket's cleanup must not remove the new channel
        channels.unregister("alice", &tx1).await;
        assert!(channels.notify("alice", ServerMessage::Pong { timestamp: 1 }).await);
        assert!(matches!(rx2.try_recv(), Ok(Outbound::Message(ServerMessage::Pong { .. }))));
    }

    #[tokio::test]
    async fn notify_without_socket_is_a_noop() {
        let channels = UserChannels::new();
        assert!(!channels.notify("ghost", ServerMessage::Pong { timestamp: 1 }).await);
    }
}
