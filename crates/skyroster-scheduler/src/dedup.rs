//! Dedup guard — at most one alert wave per (type, calendar day).
//!
//! Granularity is intentionally coarse: all qualifying candidates from one
//! evaluation batch into a single fired/not-fired decision, which prevents
//! partial-day duplicate storms when a job is re-triggered manually. Callers
//! must `mark_fired` before queueing any tasks for the tick, so a second
//! invocation on the same day is a no-op.

use std::sync::Arc;

use chrono::NaiveDate;

use skyroster_core::Result;

use crate::persistence::AlertDb;

pub struct DedupGuard {
    db: Arc<AlertDb>,
}

impl DedupGuard {
    pub fn new(db: Arc<AlertDb>) -> Self {
        Self { db }
    }

    /// True if no wave of this type has fired today.
    pub fn should_fire(&self, notification_type: &str, as_of: NaiveDate) -> Result<bool> {
        Ok(!self.db.send_log_exists(notification_type, as_of)?)
    }

    /// Record the wave. Must be called exactly once before queueing tasks.
    pub fn mark_fired(&self, notification_type: &str, as_of: NaiveDate) -> Result<()> {
        self.db.send_log_insert(notification_type, as_of)?;
        tracing::info!("🔒 Alert wave recorded: {notification_type} on {as_of}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_day() {
        let guard = DedupGuard::new(Arc::new(AlertDb::open_in_memory().unwrap()));
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        assert!(guard.should_fire("certification_expiry", day).unwrap());
        guard.mark_fired("certification_expiry", day).unwrap();
        assert!(!guard.should_fire("certification_expiry", day).unwrap());

        // Different type or day is an independent decision
        assert!(guard.should_fire("daily_digest", day).unwrap());
        let next = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert!(guard.should_fire("certification_expiry", next).unwrap());
    }

    #[test]
    fn test_mark_fired_idempotent() {
        let guard = DedupGuard::new(Arc::new(AlertDb::open_in_memory().unwrap()));
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        guard.mark_fired("certification_expiry", day).unwrap();
        guard.mark_fired("certification_expiry", day).unwrap();
        assert!(!guard.should_fire("certification_expiry", day).unwrap());
    }
}
