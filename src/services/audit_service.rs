use chrono::{DateTime, Utc};
use sqlx::{Acquire, PgExecutor, PgPool, Postgres, QueryBuilder, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{AuditLogEntry, NewAuditEntry};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Filters for audit queries. All optional; combined with AND.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor_user_id: Option<Uuid>,
    pub action: Option<String>,
    pub module: Option<String>,
    pub batch_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Append-only sink for privileged-action records.
///
/// Two write paths exist: `append` participates in the caller's
/// transaction (used when the audit row must commit atomically with the
/// state change), and `record` is the fire-and-forget path whose
/// failure is logged and swallowed - a mutation's outcome is never
/// derived from its audit write.
#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub async fn new() -> Result<Self, DatabaseError> {
        let pool = DatabaseManager::main_pool().await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Durable append on the given executor (pool or open transaction).
    pub async fn append<'e, E>(&self, executor: E, entry: &NewAuditEntry) -> Result<(), AuditError>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO audit_log_entries
                (actor_user_id, action, module, before_state, after_state,
                 reason, status, error_message, batch_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.actor_user_id)
        .bind(&entry.action)
        .bind(&entry.module)
        .bind(&entry.before_state)
        .bind(&entry.after_state)
        .bind(&entry.reason)
        .bind(entry.status.as_wire())
        .bind(&entry.error_message)
        .bind(entry.batch_id)
        .bind(&entry.metadata)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Append inside the caller's transaction, under a savepoint.
    ///
    /// On success the entry commits atomically with the caller's state
    /// change. On failure only the savepoint rolls back: the caller's
    /// work is untouched, the miss is logged and swallowed, and the
    /// caller commits a state change with no matching audit row rather
    /// than failing because of one.
    pub async fn append_in_tx(&self, tx: &mut Transaction<'_, Postgres>, entry: &NewAuditEntry) {
        let result: Result<(), AuditError> = async {
            let mut savepoint = tx.begin().await?;
            self.append(&mut *savepoint, entry).await?;
            savepoint.commit().await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            tracing::error!(
                action = %entry.action,
                module = %entry.module,
                "audit write failed (swallowed): {}",
                e
            );
        }
    }

    /// Fire-and-forget append. Any failure is reported on the process
    /// log and swallowed so the calling operation proceeds unchanged.
    pub async fn record(&self, entry: NewAuditEntry) {
        if let Err(e) = self.append(&self.pool, &entry).await {
            tracing::error!(
                action = %entry.action,
                module = %entry.module,
                "audit write failed (swallowed): {}",
                e
            );
        }
    }

    /// Paged, filtered read of the log, newest first.
    pub async fn query(&self, filters: &AuditQuery) -> Result<Vec<AuditLogEntry>, AuditError> {
        let audit_config = &crate::config::config().audit;
        let limit = filters
            .limit
            .unwrap_or(audit_config.default_page_size)
            .clamp(1, audit_config.max_page_size);
        let offset = filters.offset.unwrap_or(0).max(0);

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM audit_log_entries WHERE 1=1");
        if let Some(actor) = filters.actor_user_id {
            qb.push(" AND actor_user_id = ").push_bind(actor);
        }
        if let Some(action) = &filters.action {
            qb.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(module) = &filters.module {
            qb.push(" AND module = ").push_bind(module.clone());
        }
        if let Some(batch) = filters.batch_id {
            qb.push(" AND batch_id = ").push_bind(batch);
        }
        if let Some(since) = filters.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = filters.until {
            qb.push(" AND created_at < ").push_bind(until);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let entries = qb.build_query_as::<AuditLogEntry>().fetch_all(&self.pool).await?;
        Ok(entries)
    }

    /// Bulk read of everything older than `before`, oldest first, for
    /// retention export tooling. The export itself never deletes.
    pub async fn export_range(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let entries = sqlx::query_as::<_, AuditLogEntry>(
            "SELECT * FROM audit_log_entries WHERE created_at < $1 ORDER BY created_at ASC",
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

/// Fresh correlation id for a multi-record logical operation: every
/// audit entry the operation writes shares it.
pub fn new_batch_id() -> Uuid {
    Uuid::new_v4()
}
