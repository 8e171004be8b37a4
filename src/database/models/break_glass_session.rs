use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One emergency elevation grant. A session row is never deleted;
/// deactivation stamps `deactivated_at`. At most one row per subject
/// may have `deactivated_at IS NULL` (database-enforced).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BreakGlassSession {
    pub id: Uuid,
    pub subject_user_id: Uuid,
    pub activated_by: Uuid,
    pub reason: String,
    pub activated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivated_by: Option<Uuid>,
}

impl BreakGlassSession {
    /// Lazy expiry: an open session counts as active only while younger
    /// than the configured maximum lifetime. No background sweep runs;
    /// every read applies this predicate.
    pub fn is_active_at(&self, now: DateTime<Utc>, lifetime_hours: i64) -> bool {
        self.deactivated_at.is_none()
            && now.signed_duration_since(self.activated_at) < Duration::hours(lifetime_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_activated_hours_ago(hours: i64) -> BreakGlassSession {
        BreakGlassSession {
            id: Uuid::new_v4(),
            subject_user_id: Uuid::new_v4(),
            activated_by: Uuid::new_v4(),
            reason: "system outage".into(),
            activated_at: Utc::now() - Duration::hours(hours),
            deactivated_at: None,
            deactivated_by: None,
        }
    }

    #[test]
    fn fresh_session_is_active() {
        let s = session_activated_hours_ago(1);
        assert!(s.is_active_at(Utc::now(), 8));
    }

    #[test]
    fn session_past_lifetime_reads_inactive() {
        // activated 9 hours ago with an 8 hour lifetime
        let s = session_activated_hours_ago(9);
        assert!(!s.is_active_at(Utc::now(), 8));
    }

    #[test]
    fn deactivated_session_is_inactive_regardless_of_age() {
        let mut s = session_activated_hours_ago(1);
        s.deactivated_at = Some(Utc::now());
        assert!(!s.is_active_at(Utc::now(), 8));
    }
}
