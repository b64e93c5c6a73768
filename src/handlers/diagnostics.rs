use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use std::sync::{Arc, Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

use crate::auth::auth;
use crate::models::{DiagnosticsResponse, ErrorResponse};
use crate::services::userctx;
use crate::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Relay diagnostics: hub counters plus process stats
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
    Extension(prpls): Extension<Vec<String>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {
    // Ensure the user is a cloud admin
    let _ = auth::ensure_cloud_admin(&prpls)?;

    // Aggregate counters from the workspace hubs
    let mut n_sessions: u32 = 0;
    let mut n_presence: u32 = 0;
    let mut n_documents: u32 = 0;
    let mut n_queued: u32 = 0;
    let hubs = app_state.registry.all().await;
    let n_workspaces = hubs.len() as u32;
    for hub in hubs {
        let (sessions, presence, documents, queued) = hub.stats().await;
        n_sessions += sessions;
        n_presence += presence;
        n_documents += documents;
        n_queued += queued;
    }

    // Get the user contexts count
    let n_user_ctx = userctx::get_user_ctx_cache().entry_count() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Workspaces: {}, Sessions: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_workspaces,
        n_sessions
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_workspaces,
            n_sessions,
            n_presence,
            n_documents,
            n_queued,
            n_user_ctx,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
