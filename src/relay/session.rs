use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::models::ServerMessage;

/// Close code for a session superseded by a newer connection of the same user
pub const CLOSE_SUPERSEDED: u16 = 4000;
/// Close code for an invalid or expired access token
pub const CLOSE_INVALID_TOKEN: u16 = 4401;
/// Close code for a valid token without workspace access
pub const CLOSE_NO_ACCESS: u16 = 4403;
/// Close code for eviction by the liveness sweep
pub const CLOSE_LIVENESS_TIMEOUT: u16 = 4408;

/// Frames pushed to a session's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: &'static str },
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// One live connection of a user to a workspace. Exactly one session exists
/// per (user, workspace); a newer connection supersedes the older one.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: String,
    pub username: String,
    pub workspace_id: String,
    pub cursor_color: String,
    pub outbound: OutboundSender,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: &str,
        username: &str,
        workspace_id: &str,
        cursor_color: &str,
        outbound: OutboundSender,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            workspace_id: workspace_id.to_string(),
            cursor_color: cursor_color.to_string(),
            outbound,
            joined_at: now,
            last_seen_at: now,
        }
    }

    /// Queue a message for this session's writer task. Returns false when the
    /// transport side is gone; the caller treats that as an isolated delivery
    /// failure, never as a reason to abort a broadcast.
    pub fn send(&self, message: ServerMessage) -> bool {
        if self.outbound.send(Outbound::Message(message)).is_err() {
            debug!(
                "Outbound channel closed for user {} in workspace {}",
                self.user_id, self.workspace_id
            );
            return false;
        }
        true
    }

    /// Ask the writer task to close the transport with a specific code
    pub fn close(&self, code: u16, reason: &'static str) {
        let _ = self.outbound.send(Outbound::Close { code, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new("u1", "ada", "7", "#FF6B6B", tx);
        assert!(session.send(ServerMessage::Pong { timestamp: 1 }));

        drop(rx);
        assert!(!session.send(ServerMessage::Pong { timestamp: 2 }));
    }
}
