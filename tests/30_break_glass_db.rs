// Database-backed properties of the break-glass engine: idempotent
// activation, concurrent convergence and audit completeness. These need
// a live Postgres reachable through DATABASE_URL and are ignored by
// default; run them with `cargo test -- --ignored`.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use campus_api::config::BreakGlassConfig;
use campus_api::services::{ActivationFlow, AuditQuery, AuditService, BreakGlassService};

async fn test_pool() -> Result<PgPool> {
    let url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must point at a disposable test database")?;
    let pool = PgPoolOptions::new().max_connections(8).connect(&url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

fn engine(pool: PgPool) -> BreakGlassService {
    BreakGlassService::with_pool(
        pool,
        BreakGlassConfig {
            session_lifetime_hours: 8,
            txn_exec_secs: 30,
        },
    )
}

/// Insert a fresh user; a random email keeps tests isolated from each
/// other and from reruns.
async fn seed_user(pool: &PgPool, roles: &[&str]) -> Result<Uuid> {
    let email = format!("{}@example.edu", Uuid::new_v4().simple());
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO users (email, name, status, base_roles) \
         VALUES ($1, 'Test User', 'ACTIVE', $2) RETURNING id",
    )
    .bind(email)
    .bind(roles.iter().map(|s| s.to_string()).collect::<Vec<String>>())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn repeated_activation_keeps_first_reason() -> Result<()> {
    let pool = test_pool().await?;
    let admin = seed_user(&pool, &["ADMIN"]).await?;
    let subject = seed_user(&pool, &["FACULTY"]).await?;
    let engine = engine(pool.clone());

    let first = engine
        .activate(admin, Some(subject), "power outage", ActivationFlow::SelfElevation)
        .await?;
    assert!(first.created);

    // Second activation is a no-op success: same session, original
    // reason untouched.
    let second = engine
        .activate(admin, Some(subject), "different reason", ActivationFlow::SelfElevation)
        .await?;
    assert!(!second.created);
    assert_eq!(second.session.id, first.session.id);
    assert_eq!(second.session.reason, "power outage");
    Ok(())
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn concurrent_activations_converge_to_one_open_row() -> Result<()> {
    let pool = test_pool().await?;
    let admin = seed_user(&pool, &["ADMIN"]).await?;
    let subject = seed_user(&pool, &["FACULTY"]).await?;
    let engine = Arc::new(engine(pool.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .activate(admin, Some(subject), "incident response", ActivationFlow::SelfElevation)
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        let outcome = handle.await??;
        if outcome.created {
            created += 1;
        }
    }
    assert_eq!(created, 1, "exactly one racer should insert");

    let (open,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM break_glass_sessions \
         WHERE subject_user_id = $1 AND deactivated_at IS NULL",
    )
    .bind(subject)
    .fetch_one(&pool)
    .await?;
    assert_eq!(open, 1);
    Ok(())
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn every_attempt_writes_one_audit_entry_with_matching_outcome() -> Result<()> {
    let pool = test_pool().await?;
    let admin = seed_user(&pool, &["ADMIN"]).await?;
    let faculty = seed_user(&pool, &["FACULTY"]).await?;
    let engine = engine(pool.clone());
    let audit = AuditService::with_pool(pool.clone());

    engine
        .activate(admin, Some(faculty), "grade deadline", ActivationFlow::SelfElevation)
        .await?;
    let entries = audit
        .query(&AuditQuery {
            actor_user_id: Some(admin),
            action: Some("break_glass.activate".into()),
            ..Default::default()
        })
        .await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, "SUCCESS");

    // Rejected attempt by a faculty actor with a defaulted subject:
    // exactly one FAILED entry, and the subject it records is the
    // actor, not null.
    let attempt = engine
        .activate(faculty, None, "let me in", ActivationFlow::SelfElevation)
        .await;
    assert!(attempt.is_err());
    let entries = audit
        .query(&AuditQuery {
            actor_user_id: Some(faculty),
            action: Some("break_glass.activate".into()),
            ..Default::default()
        })
        .await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, "FAILED");
    let metadata = entries[0].metadata.as_ref().expect("rejection metadata");
    assert_eq!(metadata["subject_user_id"], serde_json::json!(faculty));
    Ok(())
}
