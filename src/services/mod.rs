pub mod audit_service;
pub mod break_glass_service;
pub mod user_service;

pub use audit_service::{AuditError, AuditQuery, AuditService};
pub use break_glass_service::{
    ActivationFlow, ActivationOutcome, BreakGlassError, BreakGlassService, StatusView,
};
pub use user_service::{NewUser, UserError, UserService};
