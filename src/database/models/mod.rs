pub mod audit_log_entry;
pub mod break_glass_session;
pub mod user;

pub use audit_log_entry::{AuditLogEntry, AuditStatus, NewAuditEntry};
pub use break_glass_session::BreakGlassSession;
pub use user::{User, UserStatus};
