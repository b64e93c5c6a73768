use tracing::{debug, error};

use crate::models::ServerMessage;
use crate::relay::session::Session;

/// Handle a ping message - liveness was already refreshed on dispatch, so
/// all that is left is to echo the client's timestamp back as a pong.
pub async fn handle_ping_message(session: &Session, timestamp: i64) {
    debug!(
        "Ping from user {} in workspace {}",
        session.user_id, session.workspace_id
    );

    if !session.send(ServerMessage::Pong { timestamp }) {
        error!("Failed to send pong to user {}", session.user_id);
    }
}
