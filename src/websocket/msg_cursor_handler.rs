use tracing::debug;

use crate::models::{CursorPosition, SelectionRange};
use crate::relay::hub::WorkspaceHub;
use crate::relay::session::Session;

/// Handle a cursor_update message: last-write-wins store plus relay to peers
pub async fn handle_cursor_message(
    hub: &WorkspaceHub,
    session: &Session,
    position: CursorPosition,
    selection: Option<SelectionRange>,
    file_path: Option<String>,
) {
    debug!(
        "Cursor update from user {} in workspace {}: {}:{}",
        session.user_id, session.workspace_id, position.line, position.column
    );
    hub.update_cursor(&session.user_id, position, selection, file_path).await;
}
