// Audit log read/export surface. Writes happen only through the sink;
// there is no mutation endpoint for the log.

use axum::extract::Query;
use axum::Extension;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::roles::{self, Permission};
use crate::services::{AuditQuery, AuditService, BreakGlassService};

#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    pub actor_user_id: Option<Uuid>,
    pub action: Option<String>,
    pub module: Option<String>,
    pub batch_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/audit - paged, filtered audit log, newest first.
pub async fn audit_get(
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<AuditQueryParams>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    require(Permission::ViewAuditLog, &auth).await?;

    let service = AuditService::new().await?;
    let entries = service
        .query(&AuditQuery {
            actor_user_id: params.actor_user_id,
            action: params.action,
            module: params.module,
            batch_id: params.batch_id,
            since: params.since,
            until: params.until,
            limit: params.limit,
            offset: params.offset,
        })
        .await?;

    Ok(ApiResponse::success(json!({
        "count": entries.len(),
        "entries": entries,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub before: DateTime<Utc>,
}

/// GET /api/audit/export?before= - bulk record set for retention
/// tooling. Read-only: the purge itself is an external concern.
pub async fn audit_export_get(
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<ExportParams>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    require(Permission::ExportAuditLog, &auth).await?;

    let service = AuditService::new().await?;
    let entries = service.export_range(params.before).await?;

    Ok(ApiResponse::success(json!({
        "before": params.before,
        "count": entries.len(),
        "entries": entries,
    })))
}

/// Permission gate on *effective* roles: an account elevated through
/// break-glass passes Admin checks for the duration of its grant.
async fn require(permission: Permission, auth: &AuthUser) -> Result<(), ApiError> {
    let engine = BreakGlassService::new(config::config().break_glass.clone()).await?;
    let effective = engine.effective_roles(auth.user_id).await?;
    if !roles::has_permission(&effective, permission) {
        return Err(ApiError::forbidden("Insufficient role for the audit log"));
    }
    Ok(())
}
