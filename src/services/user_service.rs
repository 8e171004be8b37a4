use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{NewAuditEntry, User, UserStatus};
use crate::roles::{self, Permission, Role, RoleSet, RoleSetError};
use crate::services::audit_service::{new_batch_id, AuditService};
use crate::services::break_glass_service::{BreakGlassError, BreakGlassService};

const MODULE: &str = "users";

#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error(transparent)]
    Roles(#[from] RoleSetError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub roles: Vec<Role>,
    pub department: Option<String>,
}

/// Administrative provisioning and role management. Every mutation
/// writes one audit entry; bulk provisioning correlates its entries
/// under a shared batch id. Accounts are archived, never deleted here.
///
/// Authorization is checked against *effective* roles, so an account
/// elevated through break-glass can manage users for the duration of
/// its grant.
pub struct UserService {
    pool: PgPool,
    audit: AuditService,
    break_glass: BreakGlassService,
}

impl UserService {
    pub async fn new() -> Result<Self, DatabaseError> {
        let pool = DatabaseManager::main_pool().await?;
        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            audit: AuditService::with_pool(pool.clone()),
            break_glass: BreakGlassService::with_pool(
                pool.clone(),
                crate::config::config().break_glass.clone(),
            ),
            pool,
        }
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User, UserError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| UserError::NotFound("No such user".into()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Provision one account. Role exclusivity is enforced by `RoleSet`
    /// before anything touches the store.
    pub async fn create_user(&self, actor_id: Uuid, input: NewUser) -> Result<User, UserError> {
        self.require_manage_users(actor_id).await?;
        self.create_user_unchecked(actor_id, input, None).await
    }

    /// Provision many accounts in one logical operation. All audit
    /// entries share one batch id; rows that fail are reported in the
    /// returned error list without aborting the rest.
    pub async fn create_users(
        &self,
        actor_id: Uuid,
        inputs: Vec<NewUser>,
    ) -> Result<(Vec<User>, Vec<(String, UserError)>), UserError> {
        self.require_manage_users(actor_id).await?;
        let batch_id = new_batch_id();
        let mut created = Vec::new();
        let mut failed = Vec::new();
        for input in inputs {
            let email = input.email.clone();
            match self.create_user_unchecked(actor_id, input, Some(batch_id)).await {
                Ok(user) => created.push(user),
                Err(err) => failed.push((email, err)),
            }
        }
        Ok((created, failed))
    }

    async fn create_user_unchecked(
        &self,
        actor_id: Uuid,
        input: NewUser,
        batch_id: Option<Uuid>,
    ) -> Result<User, UserError> {
        let result = self.insert_user(&input).await;

        let mut entry = match &result {
            Ok(user) => NewAuditEntry::success("users.create", MODULE)
                .after(json!({ "id": user.id, "email": user.email, "roles": user.base_roles })),
            Err(err) => NewAuditEntry::failure("users.create", MODULE, err.to_string())
                .metadata(json!({ "email": input.email })),
        };
        entry = entry.actor(actor_id);
        if let Some(batch) = batch_id {
            entry = entry.batch(batch);
        }
        self.audit.record(entry).await;

        result
    }

    async fn insert_user(&self, input: &NewUser) -> Result<User, UserError> {
        if input.email.trim().is_empty() || !input.email.contains('@') {
            return Err(UserError::Validation("A valid email is required".into()));
        }
        if input.name.trim().is_empty() {
            return Err(UserError::Validation("A display name is required".into()));
        }
        let role_set = RoleSet::new(input.roles.clone())?;

        if self.find_by_email(&input.email).await?.is_some() {
            return Err(UserError::EmailTaken(input.email.clone()));
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name, status, base_roles, department)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(input.email.trim())
        .bind(input.name.trim())
        .bind(UserStatus::Active.as_wire())
        .bind(role_set.to_wire())
        .bind(&input.department)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    /// Replace a user's base role set. Rejects the ADMIN+ACADEMIC_HEAD
    /// combination before any write happens.
    pub async fn set_roles(
        &self,
        actor_id: Uuid,
        user_id: Uuid,
        new_roles: Vec<Role>,
    ) -> Result<User, UserError> {
        self.require_manage_users(actor_id).await?;
        let existing = self.get_user(user_id).await?;

        let result = self.apply_roles(&existing, new_roles).await;

        let entry = match &result {
            Ok(updated) => NewAuditEntry::success("users.set_roles", MODULE)
                .before(json!({ "roles": existing.base_roles }))
                .after(json!({ "roles": updated.base_roles })),
            Err(err) => NewAuditEntry::failure("users.set_roles", MODULE, err.to_string())
                .before(json!({ "roles": existing.base_roles })),
        };
        self.audit
            .record(entry.actor(actor_id).metadata(json!({ "subject_user_id": user_id })))
            .await;

        result
    }

    async fn apply_roles(&self, existing: &User, new_roles: Vec<Role>) -> Result<User, UserError> {
        let role_set = RoleSet::new(new_roles)?;
        let updated = sqlx::query_as::<_, User>(
            "UPDATE users SET base_roles = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(existing.id)
        .bind(role_set.to_wire())
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    /// Archive an account. Not a deletion: the row stays for audit
    /// integrity and foreign keys; the user just stops being eligible
    /// for anything.
    pub async fn archive_user(&self, actor_id: Uuid, user_id: Uuid) -> Result<User, UserError> {
        self.require_manage_users(actor_id).await?;
        let existing = self.get_user(user_id).await?;

        let updated = sqlx::query_as::<_, User>(
            "UPDATE users SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(UserStatus::Archived.as_wire())
        .fetch_one(&self.pool)
        .await?;

        self.audit
            .record(
                NewAuditEntry::success("users.archive", MODULE)
                    .actor(actor_id)
                    .before(json!({ "status": existing.status }))
                    .after(json!({ "status": updated.status }))
                    .metadata(json!({ "subject_user_id": user_id })),
            )
            .await;

        Ok(updated)
    }

    async fn require_manage_users(&self, actor_id: Uuid) -> Result<(), UserError> {
        let effective = self
            .break_glass
            .effective_roles(actor_id)
            .await
            .map_err(|err| match err {
                BreakGlassError::NotFound(_) | BreakGlassError::Unauthenticated(_) => {
                    UserError::Forbidden("Acting user no longer exists".into())
                }
                BreakGlassError::Database(e) => UserError::Database(e),
                BreakGlassError::Timeout => UserError::Database(sqlx::Error::PoolTimedOut),
                other => UserError::Forbidden(other.to_string()),
            })?;
        if !roles::has_permission(&effective, Permission::ManageUsers) {
            return Err(UserError::Forbidden(
                "User management requires the Admin role".into(),
            ));
        }
        Ok(())
    }
}
