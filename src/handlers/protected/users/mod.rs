// User provisioning and role management endpoints. Permission and
// invariant enforcement (role exclusivity, archive-not-delete) lives in
// UserService; these handlers only shape requests and responses.

use axum::extract::Path;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::roles::Role;
use crate::services::{NewUser, UserService};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRolesRequest {
    pub roles: Vec<String>,
}

/// POST /api/users - provision one account.
pub async fn user_post(
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let roles = parse_roles(&payload.roles)?;
    let service = UserService::new().await?;
    let user = service
        .create_user(
            auth.user_id,
            NewUser {
                email: payload.email,
                name: payload.name,
                roles,
                department: payload.department,
            },
        )
        .await?;
    Ok(ApiResponse::created(json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct CreateUsersRequest {
    pub users: Vec<CreateUserRequest>,
}

/// POST /api/users/batch - provision many accounts as one logical
/// operation. Per-row failures are reported without aborting the rest;
/// every audit entry the batch writes shares one batch id.
pub async fn users_batch_post(
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateUsersRequest>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let inputs = payload
        .users
        .into_iter()
        .map(|req| {
            Ok(NewUser {
                roles: parse_roles(&req.roles)?,
                email: req.email,
                name: req.name,
                department: req.department,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let service = UserService::new().await?;
    let (created, failed) = service.create_users(auth.user_id, inputs).await?;
    let failures: Vec<_> = failed
        .into_iter()
        .map(|(email, err)| json!({ "email": email, "error": err.to_string() }))
        .collect();
    Ok(ApiResponse::created(json!({
        "created": created,
        "failed": failures,
    })))
}

/// PUT /api/users/:id/roles - replace a user's base role set.
/// A set containing both ADMIN and ACADEMIC_HEAD is rejected.
pub async fn user_roles_put(
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetRolesRequest>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let roles = parse_roles(&payload.roles)?;
    let service = UserService::new().await?;
    let user = service.set_roles(auth.user_id, user_id, roles).await?;
    Ok(ApiResponse::success(json!({ "user": user })))
}

/// DELETE /api/users/:id - archive (not delete) an account.
pub async fn user_delete(
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let service = UserService::new().await?;
    let user = service.archive_user(auth.user_id, user_id).await?;
    Ok(ApiResponse::success(json!({ "user": user })))
}

/// Unlike stored roles (which fail closed by dropping unknowns), role
/// strings in a request are a caller mistake and get a 400.
fn parse_roles(wire: &[String]) -> Result<Vec<Role>, ApiError> {
    wire.iter()
        .map(|s| {
            Role::from_wire(s).ok_or_else(|| ApiError::bad_request(format!("Unknown role: {}", s)))
        })
        .collect()
}
