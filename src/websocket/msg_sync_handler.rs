use tracing::info;

use crate::models::ServerMessage;
use crate::relay::hub::WorkspaceHub;
use crate::relay::session::Session;

/// Handle a request_sync message: a reconnecting client gets the current
/// presence roster and its queued messages instead of replayed deltas.
/// Cursor and document state re-derive from live traffic.
pub async fn handle_sync_message(hub: &WorkspaceHub, session: &Session) {
    info!(
        "Resync requested by user {} in workspace {}",
        session.user_id, session.workspace_id
    );

    let (roster, queued) = hub.sync_state(&session.user_id).await;
    session.send(ServerMessage::WorkspaceUsers(roster));
    for message in queued {
        session.send(message);
    }
}
