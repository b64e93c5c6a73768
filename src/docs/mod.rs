use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Relay is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Relay is ready", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Presence snapshot for a workspace
#[utoipa::path(
    get,
    path = "/api/v1/workspaces/{workspace_id}/presence",
    params(
        ("workspace_id" = String, Path, description = "Workspace identifier")
    ),
    responses(
        (status = 200, description = "Current presence entries", body = [PresenceEntry]),
        (status = 403, description = "Not a workspace member", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn presence_snapshot_doc() {}

/// Administrative broadcast of a system message
#[utoipa::path(
    post,
    path = "/api/v1/workspaces/{workspace_id}/broadcast",
    params(
        ("workspace_id" = String, Path, description = "Workspace identifier")
    ),
    request_body = AdminBroadcastRequest,
    responses(
        (status = 200, description = "Broadcast fanned out", body = AdminBroadcastResponse),
        (status = 400, description = "Invalid message envelope", body = ErrorResponse),
        (status = 403, description = "Service access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn admin_broadcast_doc() {}

/// Relay diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Relay and system statistics", body = DiagnosticsResponse),
        (status = 403, description = "Cloud Admin access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        presence_snapshot_doc,
        admin_broadcast_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            PresenceEntry,
            PresenceStatus,
            TypingState,
            CursorPosition,
            SelectionRange,
            CursorState,
            AdminBroadcastRequest,
            AdminBroadcastResponse,
            DiagnosticsResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "relay", description = "Real-time collaboration relay endpoints")
    )
)]
pub struct ApiDoc;
