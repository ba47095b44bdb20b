use crate::{auth::auth, models::{DiagnosticsResponse, ErrorResponse}, state::AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Sessions, rooms and caches of this instance, plus host load
pub async fn diagnostics(
    State(state): State<AppState>,
    Extension(prpls): Extension<Vec<String>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    let _ = auth::ensure_service(&prpls, &state.config.api_service_name)?;

    let n_sessions = state.sessions.active_count().await as u32;
    let n_audit_sessions = state.sessions.audit_count() as u32;
    let n_rooms = state.rooms.room_count().await as u32;
    let n_room_members = state.rooms.member_count().await as u32;
    let n_cached_paths = state.access.cached_paths().await as u32;

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
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB, Sessions: {}, Rooms: {} ({} members)",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        n_sessions,
        n_rooms,
        n_room_members
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_sessions,
            n_audit_sessions,
            n_rooms,
            n_room_members,
            n_cached_paths,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
