// handlers/protected/break_glass/status.rs - GET /api/break-glass/status

use axum::extract::Query;
use axum::Extension;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::services::{BreakGlassService, StatusView};

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub user_id: Option<Uuid>,
}

/// GET /api/break-glass/status[?user_id=] - read-only elevation status.
///
/// An Academic Head with no `user_id` sees every active session;
/// everyone may ask about themselves; asking about someone else
/// requires Admin. Expired sessions read as inactive.
pub async fn status_get(
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<StatusParams>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let service = BreakGlassService::new(config::config().break_glass.clone()).await?;
    let view = service.status(auth.user_id, params.user_id).await?;

    let body = match view {
        StatusView::SystemWide(sessions) => json!({
            "is_active": !sessions.is_empty(),
            "sessions": sessions,
        }),
        StatusView::Single { user_id, session } => json!({
            "user_id": user_id,
            "is_active": session.is_some(),
            "session": session,
        }),
    };
    Ok(ApiResponse::success(body))
}
