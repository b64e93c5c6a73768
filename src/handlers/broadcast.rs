use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::auth;
use crate::models::{AdminBroadcastRequest, AdminBroadcastResponse, ErrorResponse, ServerMessage};
use crate::AppState;

/// Administrative broadcast of a system-initiated message to a workspace.
/// Delivered to every live session, queued for members inside the disconnect
/// grace window, and forwarded to members' notification sockets.
pub async fn admin_broadcast(
    State(app_state): State<Arc<AppState>>,
    Extension(prpls): Extension<Vec<String>>,
    Path(workspace_id): Path<String>,
    Json(request): Json<AdminBroadcastRequest>,
) -> Result<(StatusCode, Json<AdminBroadcastResponse>), (StatusCode, Json<ErrorResponse>)> {
    // Only sibling services and cloud admins may inject messages
    let sender = auth::ensure_service_or_cloud_admin(&prpls)?;

    // The body carries a full server envelope; validate it against the protocol
    let message: ServerMessage = match serde_json::from_value(request.message.clone()) {
        Ok(message) => message,
        Err(e) => {
            error!("Rejected admin broadcast with invalid envelope: {}", e);
            let status = StatusCode::BAD_REQUEST;
            return Err((status, Json(ErrorResponse::new(
                status,
                format!("Invalid message envelope: {}", e),
            ))));
        }
    };

    let (delivered, queued) = match app_state.registry.get(&workspace_id).await {
        Some(hub) => {
            let counts = hub.broadcast_system(message.clone()).await;

            // Cross-workspace path: members also get the notice on their
            // user-scoped socket if one is open
            for entry in hub.snapshot().await {
                app_state.user_channels.notify(&entry.user_id, message.clone()).await;
            }
            counts
        }
        None => (0, 0),
    };

    info!(
        "System broadcast to workspace {} by {}: delivered={}, queued={}",
        workspace_id, sender, delivered, queued
    );
    Ok((StatusCode::OK, Json(AdminBroadcastResponse { delivered, queued })))
}
