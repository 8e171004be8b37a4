use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::BreakGlassConfig;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{BreakGlassSession, NewAuditEntry, User};
use crate::roles::Role;
use crate::services::audit_service::AuditService;

const MODULE: &str = "break_glass";

#[derive(Debug, Error)]
pub enum BreakGlassError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Precondition(String),

    #[error("operation did not complete within the configured ceiling")]
    Timeout,

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for BreakGlassError {
    fn from(err: sqlx::Error) -> Self {
        // A pool acquire that hits its wait ceiling is retryable, not a
        // server fault.
        match err {
            sqlx::Error::PoolTimedOut => BreakGlassError::Timeout,
            other => BreakGlassError::Database(other),
        }
    }
}

/// The two supported activation variants. They coexist deliberately and
/// carry different actor/subject rules; neither is the canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationFlow {
    /// Admin elevates any subject; Academic Head only themselves.
    SelfElevation,
    /// Academic Head (or Admin) elevates a designated FACULTY member.
    /// Self-promotion through this path is always rejected.
    DelegatedPromotion,
}

impl ActivationFlow {
    fn action(&self) -> &'static str {
        match self {
            ActivationFlow::SelfElevation => "break_glass.activate",
            ActivationFlow::DelegatedPromotion => "break_glass.promote",
        }
    }
}

/// Result of one activation call. `created` is false on the idempotent
/// path: a session was already open for the subject and is returned
/// unchanged, original activator and reason intact.
#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    pub session: BreakGlassSession,
    pub created: bool,
}

/// Answer to a status query.
#[derive(Debug, Clone)]
pub enum StatusView {
    /// Every unexpired active session, system-wide.
    SystemWide(Vec<BreakGlassSession>),
    /// One subject's current session, if any.
    Single {
        user_id: Uuid,
        session: Option<BreakGlassSession>,
    },
}

/// State machine for emergency elevation. All rules that need only the
/// actor and subject rows live in pure functions below; everything
/// touching the store runs under the configured execution ceiling, with
/// the partial unique index on open sessions as the serialization point
/// for concurrent activations.
pub struct BreakGlassService {
    pool: PgPool,
    audit: AuditService,
    config: BreakGlassConfig,
}

impl BreakGlassService {
    pub async fn new(config: BreakGlassConfig) -> Result<Self, DatabaseError> {
        let pool = DatabaseManager::main_pool().await?;
        Ok(Self::with_pool(pool, config))
    }

    pub fn with_pool(pool: PgPool, config: BreakGlassConfig) -> Self {
        Self {
            audit: AuditService::with_pool(pool.clone()),
            pool,
            config,
        }
    }

    /// Grant (or confirm) emergency elevation for a subject.
    ///
    /// Idempotent per subject: if a session is already open, the call
    /// succeeds without creating a second row or overwriting the
    /// original reason. Exactly one audit entry describes the attempt,
    /// whether it succeeds or is rejected.
    pub async fn activate(
        &self,
        actor_id: Uuid,
        subject_id: Option<Uuid>,
        reason: &str,
        flow: ActivationFlow,
    ) -> Result<ActivationOutcome, BreakGlassError> {
        let ceiling = std::time::Duration::from_secs(self.config.txn_exec_secs);
        let result = match tokio::time::timeout(
            ceiling,
            self.activate_inner(actor_id, subject_id, reason, flow),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BreakGlassError::Timeout),
        };

        if let Err(err) = &result {
            // Record the subject the attempt was actually about: a
            // self-elevation with no explicit subject targets the actor.
            let audit_subject = subject_id.or(match flow {
                ActivationFlow::SelfElevation => Some(actor_id),
                ActivationFlow::DelegatedPromotion => None,
            });
            self.audit_rejection(flow.action(), actor_id, audit_subject, reason, err)
                .await;
        }
        result
    }

    async fn activate_inner(
        &self,
        actor_id: Uuid,
        subject_id: Option<Uuid>,
        reason: &str,
        flow: ActivationFlow,
    ) -> Result<ActivationOutcome, BreakGlassError> {
        validate_reason(reason)?;

        let actor = self.load_actor(actor_id).await?;
        // In the self-elevation flow the subject defaults to the actor;
        // delegated promotion must always name its faculty subject.
        let subject_id = match (subject_id, flow) {
            (Some(id), _) => id,
            (None, ActivationFlow::SelfElevation) => actor_id,
            (None, ActivationFlow::DelegatedPromotion) => {
                return Err(BreakGlassError::Validation(
                    "A faculty subject is required for delegated promotion".into(),
                ))
            }
        };
        let subject = self.load_subject(subject_id).await?;

        authorize_activation(flow, &actor, &subject)?;

        let now = Utc::now();
        let cutoff = now - Duration::hours(self.config.session_lifetime_hours);

        let mut tx = self.pool.begin().await?;

        // Reconcile lazy expiry before inserting: an expired-but-open
        // row still occupies the unique slot and must be closed out.
        sqlx::query(
            r#"
            UPDATE break_glass_sessions
            SET deactivated_at = $2
            WHERE subject_user_id = $1 AND deactivated_at IS NULL AND activated_at < $3
            "#,
        )
        .bind(subject.id)
        .bind(now)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        // The partial unique index makes this the serialization point:
        // of N concurrent activations exactly one inserts, the rest
        // observe the committed row and take the no-op path.
        let inserted = sqlx::query_as::<_, BreakGlassSession>(
            r#"
            INSERT INTO break_glass_sessions (subject_user_id, activated_by, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (subject_user_id) WHERE deactivated_at IS NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(subject.id)
        .bind(actor.id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await?;

        let (session, created) = match inserted {
            Some(session) => (session, true),
            None => {
                let existing = sqlx::query_as::<_, BreakGlassSession>(
                    "SELECT * FROM break_glass_sessions \
                     WHERE subject_user_id = $1 AND deactivated_at IS NULL",
                )
                .bind(subject.id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(BreakGlassError::Database(sqlx::Error::RowNotFound))?;
                (existing, false)
            }
        };

        let entry = NewAuditEntry::success(flow.action(), MODULE)
            .actor(actor.id)
            .reason(reason)
            .before(json!({
                "subject_roles": subject.base_roles,
                "break_glass_active": !created,
            }))
            .after(json!({
                "subject_roles": subject.base_roles,
                "effective_roles_include_admin": true,
                "break_glass_active": true,
            }))
            .metadata(json!({
                "subject_user_id": subject.id,
                "session_id": session.id,
                "idempotent_noop": !created,
            }));
        self.audit.append_in_tx(&mut tx, &entry).await;

        tx.commit().await?;

        Ok(ActivationOutcome { session, created })
    }

    /// End the subject's open session, restoring base roles. A no-op on
    /// an already-inactive subject, still audited as a success.
    pub async fn deactivate(
        &self,
        actor_id: Uuid,
        subject_id: Option<Uuid>,
    ) -> Result<(), BreakGlassError> {
        let ceiling = std::time::Duration::from_secs(self.config.txn_exec_secs);
        let result = match tokio::time::timeout(
            ceiling,
            self.deactivate_inner(actor_id, subject_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BreakGlassError::Timeout),
        };

        if let Err(err) = &result {
            let audit_subject = Some(subject_id.unwrap_or(actor_id));
            self.audit_rejection("break_glass.deactivate", actor_id, audit_subject, "", err)
                .await;
        }
        result
    }

    async fn deactivate_inner(
        &self,
        actor_id: Uuid,
        subject_id: Option<Uuid>,
    ) -> Result<(), BreakGlassError> {
        let actor = self.load_actor(actor_id).await?;
        let subject_id = subject_id.unwrap_or(actor_id);
        let subject = self.load_subject(subject_id).await?;

        authorize_deactivation(&actor, &subject)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let ended = sqlx::query_as::<_, BreakGlassSession>(
            r#"
            UPDATE break_glass_sessions
            SET deactivated_at = $2, deactivated_by = $3
            WHERE subject_user_id = $1 AND deactivated_at IS NULL
            RETURNING *
            "#,
        )
        .bind(subject.id)
        .bind(now)
        .bind(actor.id)
        .fetch_optional(&mut *tx)
        .await?;

        let entry = NewAuditEntry::success("break_glass.deactivate", MODULE)
            .actor(actor.id)
            .before(json!({
                "subject_roles": subject.base_roles,
                "break_glass_active": ended.is_some(),
            }))
            .after(json!({
                "subject_roles": subject.base_roles,
                "break_glass_active": false,
            }))
            .metadata(json!({
                "subject_user_id": subject.id,
                "session_id": ended.as_ref().map(|s| s.id),
                "idempotent_noop": ended.is_none(),
            }));
        self.audit.append_in_tx(&mut tx, &entry).await;

        tx.commit().await?;
        Ok(())
    }

    /// Read-only status query. Not audited: status checks are not
    /// privileged mutations.
    pub async fn status(
        &self,
        requestor_id: Uuid,
        target_id: Option<Uuid>,
    ) -> Result<StatusView, BreakGlassError> {
        let requestor = self.load_actor(requestor_id).await?;
        let cutoff = Utc::now() - Duration::hours(self.config.session_lifetime_hours);

        match target_id {
            // An Academic Head with no target sees every active session.
            None if requestor.holds(Role::AcademicHead) => {
                let sessions = self.active_sessions(cutoff).await?;
                Ok(StatusView::SystemWide(sessions))
            }
            None => {
                let session = self.active_session_of(requestor_id, cutoff).await?;
                Ok(StatusView::Single {
                    user_id: requestor_id,
                    session,
                })
            }
            Some(target) => {
                if target != requestor_id && !requestor.holds(Role::Admin) {
                    return Err(BreakGlassError::Forbidden(
                        "Querying another user's status requires Admin".into(),
                    ));
                }
                let session = self.active_session_of(target, cutoff).await?;
                Ok(StatusView::Single {
                    user_id: target,
                    session,
                })
            }
        }
    }

    /// Roles downstream authorization should use right now: base roles,
    /// plus ADMIN while an unexpired session is open. An archived
    /// account has no effective roles at all.
    pub async fn effective_roles(&self, user_id: Uuid) -> Result<Vec<Role>, BreakGlassError> {
        let user = self.load_subject(user_id).await?;
        let elevated = user.is_active() && {
            let cutoff = Utc::now() - Duration::hours(self.config.session_lifetime_hours);
            self.active_session_of(user_id, cutoff).await?.is_some()
        };
        Ok(effective_of(&user, elevated))
    }

    async fn active_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BreakGlassSession>, BreakGlassError> {
        let sessions = sqlx::query_as::<_, BreakGlassSession>(
            "SELECT * FROM break_glass_sessions \
             WHERE deactivated_at IS NULL AND activated_at >= $1 \
             ORDER BY activated_at DESC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn active_session_of(
        &self,
        subject_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<BreakGlassSession>, BreakGlassError> {
        let session = sqlx::query_as::<_, BreakGlassSession>(
            "SELECT * FROM break_glass_sessions \
             WHERE subject_user_id = $1 AND deactivated_at IS NULL AND activated_at >= $2",
        )
        .bind(subject_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn load_actor(&self, actor_id: Uuid) -> Result<User, BreakGlassError> {
        self.load_user(actor_id).await?.ok_or_else(|| {
            BreakGlassError::Unauthenticated("Acting user no longer exists".into())
        })
    }

    async fn load_subject(&self, subject_id: Uuid) -> Result<User, BreakGlassError> {
        self.load_user(subject_id)
            .await?
            .ok_or_else(|| BreakGlassError::NotFound("Subject user not found".into()))
    }

    async fn load_user(&self, id: Uuid) -> Result<Option<User>, BreakGlassError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Best-effort audit of a rejected attempt. Identity is already
    /// resolved by the time we get here, so rejections are recorded;
    /// the write itself is fire-and-forget.
    async fn audit_rejection(
        &self,
        action: &str,
        actor_id: Uuid,
        subject_id: Option<Uuid>,
        reason: &str,
        err: &BreakGlassError,
    ) {
        let mut entry = NewAuditEntry::failure(action, MODULE, err.to_string())
            .actor(actor_id)
            .metadata(json!({ "subject_user_id": subject_id }));
        if !reason.trim().is_empty() {
            entry = entry.reason(reason);
        }
        self.audit.record(entry).await;
    }
}

/// Roles a user holds right now. Archive strips everything: an
/// archived account keeps its row but is eligible for nothing.
fn effective_of(user: &User, elevated: bool) -> Vec<Role> {
    if !user.is_active() {
        return Vec::new();
    }
    let mut roles = user.roles();
    if elevated && !roles.contains(&Role::Admin) {
        roles.push(Role::Admin);
    }
    roles
}

fn validate_reason(reason: &str) -> Result<(), BreakGlassError> {
    if reason.trim().is_empty() {
        return Err(BreakGlassError::Validation(
            "A reason is required to activate break-glass".into(),
        ));
    }
    Ok(())
}

/// Actor/subject policy for activation. Pure: depends only on the two
/// user rows and the flow.
fn authorize_activation(
    flow: ActivationFlow,
    actor: &User,
    subject: &User,
) -> Result<(), BreakGlassError> {
    if !actor.is_active() {
        return Err(BreakGlassError::Forbidden(
            "Archived accounts cannot activate break-glass".into(),
        ));
    }

    let is_admin = actor.holds(Role::Admin);
    let is_head = actor.holds(Role::AcademicHead);

    if !is_admin && !is_head {
        return Err(BreakGlassError::Forbidden(
            "Only Admin and Academic Head can activate break-glass".into(),
        ));
    }

    if !subject.is_active() {
        return Err(BreakGlassError::Precondition(
            "Subject account is archived".into(),
        ));
    }

    match flow {
        ActivationFlow::SelfElevation => {
            if is_admin || actor.id == subject.id {
                Ok(())
            } else {
                Err(BreakGlassError::Forbidden(
                    "Academic Head may only activate break-glass for themselves".into(),
                ))
            }
        }
        ActivationFlow::DelegatedPromotion => {
            if actor.id == subject.id {
                return Err(BreakGlassError::Forbidden(
                    "Academic Head cannot promote themselves".into(),
                ));
            }
            if !subject.is_faculty_only() {
                return Err(BreakGlassError::Precondition(
                    "Delegated promotion requires a subject holding exactly the FACULTY role"
                        .into(),
                ));
            }
            Ok(())
        }
    }
}

/// Deactivation policy: Admin for any subject, Academic Head for
/// themselves only.
fn authorize_deactivation(actor: &User, subject: &User) -> Result<(), BreakGlassError> {
    if !actor.is_active() {
        return Err(BreakGlassError::Forbidden(
            "Archived accounts cannot act on break-glass sessions".into(),
        ));
    }
    if actor.holds(Role::Admin) {
        return Ok(());
    }
    if actor.holds(Role::AcademicHead) && actor.id == subject.id {
        return Ok(());
    }
    Err(BreakGlassError::Forbidden(
        "Deactivation requires Admin, or Academic Head for their own session".into(),
    ))
}
