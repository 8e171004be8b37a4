use axum::{middleware::from_fn, routing::get, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use campus_api::{config, database, handlers, middleware};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Initialize configuration (this loads the config singleton)
    let app_config = config::config();
    tracing::info!("Starting Campus API in {:?} mode", app_config.environment);

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("CAMPUS_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Campus API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        // Protected API
        .merge(api_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn auth_public_routes() -> Router {
    use axum::routing::post;
    use handlers::public::auth;

    Router::new().route("/auth/login", post(auth::login_post))
}

fn api_routes() -> Router {
    use axum::routing::{delete, post, put};
    use handlers::protected::{audit, break_glass, users};

    Router::new()
        // Break-glass elevation
        .route("/api/break-glass/activate", post(break_glass::activate_post))
        .route("/api/break-glass/promote", post(break_glass::promote_post))
        .route("/api/break-glass/status", get(break_glass::status_get))
        .route("/api/break-glass/deactivate", post(break_glass::deactivate_post))
        // Audit log (read/export only; there is no write endpoint)
        .route("/api/audit", get(audit::audit_get))
        .route("/api/audit/export", get(audit::audit_export_get))
        // User provisioning and role management
        .route("/api/users", post(users::user_post))
        .route("/api/users/batch", post(users::users_batch_post))
        .route("/api/users/:id/roles", put(users::user_roles_put))
        .route("/api/users/:id", delete(users::user_delete))
        // JWT auth applies to every /api route
        .route_layer(from_fn(middleware::jwt_auth_middleware))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Campus API",
            "version": version,
            "description": "Academic administration backend: roles, break-glass elevation and audit trail",
            "endpoints": {
                "home": "/ (public)",
                "public_auth": "/auth/login (public - token acquisition)",
                "break_glass": "/api/break-glass/* (protected)",
                "audit": "/api/audit[/export] (protected)",
                "users": "/api/users[/:id] (protected)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match database::manager::DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
