// handlers/protected/break_glass/promote.rs - POST /api/break-glass/promote

use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::services::{ActivationFlow, BreakGlassService};

#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    pub faculty_user_id: Uuid,
    pub reason: Option<String>,
}

/// POST /api/break-glass/promote - delegated-promotion flow.
///
/// An Academic Head elevates a designated FACULTY member. The subject
/// must hold exactly the FACULTY role, and self-promotion through this
/// path is rejected outright.
pub async fn promote_post(
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<PromoteRequest>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let reason = payload.reason.unwrap_or_default();

    let service = BreakGlassService::new(config::config().break_glass.clone()).await?;
    let outcome = service
        .activate(
            auth.user_id,
            Some(payload.faculty_user_id),
            &reason,
            ActivationFlow::DelegatedPromotion,
        )
        .await?;

    let message = if outcome.created {
        "Faculty member promoted under break-glass"
    } else {
        "Break-glass already active for this subject"
    };
    Ok(ApiResponse::success(json!({
        "message": message,
        "session": outcome.session,
    })))
}
