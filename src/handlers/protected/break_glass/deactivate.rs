// handlers/protected/break_glass/deactivate.rs - POST /api/break-glass/deactivate

use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::services::BreakGlassService;

#[derive(Debug, Deserialize, Default)]
pub struct DeactivateRequest {
    /// Defaults to the caller's own session.
    pub subject_user_id: Option<Uuid>,
}

/// POST /api/break-glass/deactivate - end an elevation grant.
///
/// Admin for any subject, Academic Head for themselves. Idempotent:
/// deactivating an already-inactive subject succeeds and changes
/// nothing.
pub async fn deactivate_post(
    Extension(auth): Extension<AuthUser>,
    payload: Option<Json<DeactivateRequest>>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let subject = payload.and_then(|Json(p)| p.subject_user_id);

    let service = BreakGlassService::new(config::config().break_glass.clone()).await?;
    service.deactivate(auth.user_id, subject).await?;

    Ok(ApiResponse::success(json!({
        "message": "Break-glass inactive; base roles restored",
    })))
}
