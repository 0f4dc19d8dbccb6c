//! Cleanup sweeper — purges send-log rows and terminal queue entries past
//! the retention window. Idempotent; never deletes a pending task, so it is
//! safe to run alongside enqueue and drain.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use skyroster_core::Result;

use crate::persistence::AlertDb;

pub struct CleanupSweeper {
    db: Arc<AlertDb>,
}

/// Counts from one sweep pass, for logging.
#[derive(Debug, Clone, Serialize)]
pub struct SweepStats {
    pub log_removed: usize,
    pub tasks_removed: usize,
}

impl CleanupSweeper {
    pub fn new(db: Arc<AlertDb>) -> Self {
        Self { db }
    }

    /// Delete rows older than the retention window.
    pub fn sweep(&self, retention: Duration) -> Result<SweepStats> {
        let cutoff = Utc::now() - retention;
        let (log_removed, tasks_removed) = self.db.purge_older_than(cutoff)?;
        if log_removed > 0 || tasks_removed > 0 {
            tracing::info!(
                "🧹 Cleanup: removed {log_removed} send-log rows, {tasks_removed} terminal tasks"
            );
        }
        Ok(SweepStats {
            log_removed,
            tasks_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{NotificationQueue, NotificationTask};
    use chrono::NaiveDate;

    fn old_task(recipient: &str, age_days: i64) -> NotificationTask {
        let mut task = NotificationTask::new(
            recipient,
            "certification_expiry",
            "subject",
            "certification-expiry",
            serde_json::json!({}),
            2,
        );
        task.created_at = Utc::now() - Duration::days(age_days);
        task
    }

    #[test]
    fn test_old_terminal_deleted_old_pending_kept() {
        let db = Arc::new(AlertDb::open_in_memory().unwrap());
        let queue = NotificationQueue::new(db.clone(), 1);

        let failed = old_task("failed@x", 40);
        queue.enqueue(&failed).unwrap();
        queue.mark_failed(&failed.id, "boom").unwrap(); // max_attempts 1: terminal

        let pending = old_task("pending@x", 40);
        queue.enqueue(&pending).unwrap();

        let recent_sent = old_task("sent@x", 2);
        queue.enqueue(&recent_sent).unwrap();
        queue.mark_sent(&recent_sent.id).unwrap();

        let stats = CleanupSweeper::new(db.clone())
            .sweep(Duration::days(30))
            .unwrap();
        assert_eq!(stats.tasks_removed, 1);

        // The 40-day-old pending task survives, the recent sent task survives
        assert!(db.get_task(&failed.id).unwrap().is_none());
        assert!(db.get_task(&pending.id).unwrap().is_some());
        assert!(db.get_task(&recent_sent.id).unwrap().is_some());
    }

    #[test]
    fn test_sweep_idempotent() {
        let db = Arc::new(AlertDb::open_in_memory().unwrap());
        db.send_log_insert(
            "certification_expiry",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        )
        .unwrap();
        let sweeper = CleanupSweeper::new(db);

        // Retention 0: the just-created row is already older than now
        let first = sweeper.sweep(Duration::days(0)).unwrap();
        assert_eq!(first.log_removed, 1);
        let second = sweeper.sweep(Duration::days(0)).unwrap();
        assert_eq!(second.log_removed, 0);
    }
}
