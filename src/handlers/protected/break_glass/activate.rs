// handlers/protected/break_glass/activate.rs - POST /api/break-glass/activate

use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::services::{ActivationFlow, BreakGlassService};

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    /// Defaults to the caller: an Academic Head elevating themselves.
    pub subject_user_id: Option<Uuid>,
    pub reason: Option<String>,
}

/// POST /api/break-glass/activate - self-elevation flow.
///
/// Admin may name any subject; an Academic Head may only elevate
/// themselves here. Repeating the call while a session is open is a
/// success that returns the existing session untouched.
pub async fn activate_post(
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<ActivateRequest>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let reason = payload.reason.unwrap_or_default();

    let service = BreakGlassService::new(config::config().break_glass.clone()).await?;
    let outcome = service
        .activate(
            auth.user_id,
            payload.subject_user_id,
            &reason,
            ActivationFlow::SelfElevation,
        )
        .await?;

    let message = if outcome.created {
        "Break-glass activated"
    } else {
        "Break-glass already active for this subject"
    };
    Ok(ApiResponse::success(json!({
        "message": message,
        "session": outcome.session,
    })))
}
