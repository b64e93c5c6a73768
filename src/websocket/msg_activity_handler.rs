use tracing::info;

use crate::relay::hub::WorkspaceHub;
use crate::relay::session::Session;

/// Handle an activity_update message
pub async fn handle_activity_message(
    hub: &WorkspaceHub,
    session: &Session,
    activity: String,
    details: Option<serde_json::Value>,
) {
    info!(
        "Activity update from user {} in workspace {}: {}",
        session.user_id, session.workspace_id, activity
    );
    hub.update_activity(&session.user_id, activity, details).await;
}
