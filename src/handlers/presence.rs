use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::auth::auth;
use crate::models::{ErrorResponse, PresenceEntry};
use crate::AppState;

/// Point-in-time presence snapshot for a workspace. Read-only companion to
/// the live socket, used by pages that have not opened a connection yet.
pub async fn presence_snapshot(
    State(app_state): State<Arc<AppState>>,
    Extension(prpls): Extension<Vec<String>>,
    Path(workspace_id): Path<String>,
) -> Result<(StatusCode, Json<Vec<PresenceEntry>>), (StatusCode, Json<ErrorResponse>)> {
    // Ensure the caller is a member of the workspace
    auth::ensure_workspace_member(&prpls, &workspace_id)?;

    // A workspace without a hub simply has nobody present
    let roster = match app_state.registry.get(&workspace_id).await {
        Some(hub) => hub.snapshot().await,
        None => Vec::new(),
    };

    debug!(
        "Presence snapshot for workspace {}: {} entries",
        workspace_id,
        roster.len()
    );
    Ok((StatusCode::OK, Json(roster)))
}
