// handlers/public/auth/login.rs - POST /auth/login handler

use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::config;
use crate::database::models::NewAuditEntry;
use crate::error::ApiError;
use crate::middleware::ApiResponse;
use crate::services::{AuditService, UserService};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

/// POST /auth/login - Exchange a known identity for a JWT.
///
/// The upstream OAuth flow terminates before this service; by the time
/// a request lands here the portal has already verified the identity,
/// so this endpoint only resolves the account and mints the token.
/// Failed attempts are audited with no actor (identity unresolved).
pub async fn login_post(
    Json(payload): Json<LoginRequest>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }

    let users = UserService::new().await?;
    let audit = AuditService::new().await?;

    let user = match users.find_by_email(payload.email.trim()).await? {
        Some(user) if user.is_active() => user,
        found => {
            let detail = if found.is_some() {
                "account archived"
            } else {
                "unknown email"
            };
            audit
                .record(
                    NewAuditEntry::failure("auth.login", "auth", detail)
                        .metadata(json!({ "email": payload.email.trim() })),
                )
                .await;
            // One message for both cases; don't leak which emails exist.
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    let claims = Claims::new(user.id, user.email.clone(), user.base_roles.clone());
    let token = generate_jwt(claims)
        .map_err(|e| ApiError::internal_server_error(format!("Token generation failed: {}", e)))?;

    audit
        .record(NewAuditEntry::success("auth.login", "auth").actor(user.id))
        .await;

    let expires_in = config::config().security.jwt_expiry_hours * 3600;
    Ok(ApiResponse::success(json!({
        "token": token,
        "user": {
            "id": user.id,
            "email": user.email,
            "name": user.name,
            "roles": user.base_roles,
        },
        "expires_in": expires_in,
    })))
}
