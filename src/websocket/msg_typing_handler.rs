use tracing::debug;

use crate::relay::hub::WorkspaceHub;
use crate::relay::session::Session;

/// Handle a typing_indicator message
pub async fn handle_typing_message(
    hub: &WorkspaceHub,
    session: &Session,
    is_typing: bool,
    location: Option<String>,
) {
    debug!(
        "Typing indicator from user {} in workspace {}: is_typing={}",
        session.user_id, session.workspace_id, is_typing
    );
    hub.update_typing(&session.user_id, is_typing, location).await;
}
