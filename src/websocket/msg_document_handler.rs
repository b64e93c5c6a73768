use tracing::info;

use crate::models::DocumentOperation;
use crate::relay::hub::WorkspaceHub;
use crate::relay::session::Session;

/// Handle a document_update message
pub async fn handle_document_message(
    hub: &WorkspaceHub,
    session: &Session,
    document_id: String,
    base_version: Option<u64>,
    operation: DocumentOperation,
) {
    let version = hub
        .apply_document_update(&session.user_id, &document_id, base_version, operation)
        .await;

    if let Some(version) = version {
        info!(
            "Document update accepted for {} in workspace {}: user={}, version={}",
            document_id, session.workspace_id, session.user_id, version
        );
    }
}
