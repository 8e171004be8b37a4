use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub break_glass: BreakGlassConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// Ceiling on waiting for a pooled connection, in seconds. A stuck
    /// pool surfaces as a retryable timeout instead of hanging callers.
    pub acquire_timeout_secs: u64,
    pub enable_query_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakGlassConfig {
    /// Maximum lifetime of an elevation grant. Sessions older than this
    /// read as inactive even without an explicit deactivation.
    pub session_lifetime_hours: i64,
    /// Overall execution ceiling for one activate/deactivate call, in
    /// seconds. Exceeding it fails the call with a retryable error.
    pub txn_exec_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub retention_days: u32,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs = v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Break-glass overrides
        if let Ok(v) = env::var("BREAK_GLASS_SESSION_LIFETIME_HOURS") {
            self.break_glass.session_lifetime_hours =
                v.parse().unwrap_or(self.break_glass.session_lifetime_hours);
        }
        if let Ok(v) = env::var("BREAK_GLASS_TXN_EXEC_SECS") {
            self.break_glass.txn_exec_secs = v.parse().unwrap_or(self.break_glass.txn_exec_secs);
        }

        // Audit overrides
        if let Ok(v) = env::var("AUDIT_RETENTION_DAYS") {
            self.audit.retention_days = v.parse().unwrap_or(self.audit.retention_days);
        }
        if let Ok(v) = env::var("AUDIT_DEFAULT_PAGE_SIZE") {
            self.audit.default_page_size = v.parse().unwrap_or(self.audit.default_page_size);
        }
        if let Ok(v) = env::var("AUDIT_MAX_PAGE_SIZE") {
            self.audit.max_page_size = v.parse().unwrap_or(self.audit.max_page_size);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                acquire_timeout_secs: 30,
                enable_query_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "dev-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                enable_cors: true,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            break_glass: BreakGlassConfig {
                session_lifetime_hours: 8,
                txn_exec_secs: 30,
            },
            audit: AuditConfig {
                retention_days: 30,
                default_page_size: 50,
                max_page_size: 1000,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                acquire_timeout_secs: 10,
                enable_query_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                jwt_expiry_hours: 24,
                enable_cors: true,
                cors_origins: vec!["https://staging.portal.example.edu".to_string()],
            },
            break_glass: BreakGlassConfig {
                session_lifetime_hours: 8,
                txn_exec_secs: 10,
            },
            audit: AuditConfig {
                retention_days: 180,
                default_page_size: 50,
                max_page_size: 500,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                acquire_timeout_secs: 5,
                enable_query_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                jwt_expiry_hours: 4,
                enable_cors: true,
                cors_origins: vec!["https://portal.example.edu".to_string()],
            },
            break_glass: BreakGlassConfig {
                session_lifetime_hours: 8,
                txn_exec_secs: 10,
            },
            audit: AuditConfig {
                retention_days: 365 * 2,
                default_page_size: 50,
                max_page_size: 500,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
