use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use chatmate_shared::errors::{AppError, AppResult, ErrorCode};
use chatmate_shared::types::api::ApiResponse;

use crate::bot::messages;
use crate::models::ChatSession;
use crate::profile::{profile_completion_status, ProfileCompletionStatus};
use crate::session::manager::END_REASON_ADMIN;
use crate::AppState;

// --- Users ---

pub async fn get_completion(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<ProfileCompletionStatus>>> {
    let status = profile_completion_status(state.profiles.as_ref(), user_id)?;
    Ok(Json(ApiResponse::ok(status)))
}

pub async fn get_active_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<ChatSession>>> {
    let session = state.sessions.get_active_session(user_id)?.ok_or_else(|| {
        AppError::new(
            ErrorCode::SessionNotFound,
            format!("user {user_id} has no active session"),
        )
    })?;
    Ok(Json(ApiResponse::ok(session)))
}

// --- Sessions ---

/// Hook for external schedulers: end a session and tell both participants.
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
) -> AppResult<Json<ApiResponse<ChatSession>>> {
    let ended = state.sessions.end_session(session_id, END_REASON_ADMIN)?;
    let session = ended.session;

    if ended.transitioned {
        for user_id in [session.user1_id, session.user2_id] {
            if let Err(e) = state.transport.send_text(user_id, messages::CHAT_CLOSED_BY_ADMIN).await {
                tracing::warn!(session_id, user_id, error = %e, "failed to notify participant");
            }
        }
    }

    Ok(Json(ApiResponse::ok_with_message(session, "session ended")))
}
