//! Notification queue — durable list of pending dispatch tasks with priority
//! and retry state.
//!
//! Tasks are owned by the queue until terminal and mutated only through
//! `mark_sent` / `mark_failed`. Drain order is priority ascending, then FIFO
//! within equal priority, so urgent alerts are never starved by backlog.
//!
//! Status machine:
//! ```text
//! Pending --success-------------------> Sent    (terminal)
//! Pending --failure, attempts < max --> Pending (attempts + 1)
//! Pending --failure, attempts == max -> Failed  (terminal)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skyroster_core::Result;

use crate::persistence::AlertDb;

/// Task status. Sent and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Sent,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Sent => "sent",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => TaskStatus::Sent,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        }
    }
}

/// A single notification dispatch task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTask {
    pub id: String,
    pub recipient: String,
    /// Alert category key, e.g. "certification_expiry". Also the dedup key.
    pub notification_type: String,
    pub subject: String,
    pub template_name: String,
    /// Template payload: pilot identity, check code, expiry date, days left.
    pub template_data: serde_json::Value,
    /// Lower = more urgent. Derived from days remaining.
    pub priority: i32,
    pub status: TaskStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl NotificationTask {
    pub fn new(
        recipient: &str,
        notification_type: &str,
        subject: &str,
        template_name: &str,
        template_data: serde_json::Value,
        priority: i32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient: recipient.to_string(),
            notification_type: notification_type.to_string(),
            subject: subject.to_string(),
            template_name: template_name.to_string(),
            template_data,
            priority,
            status: TaskStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            sent_at: None,
            last_error: None,
        }
    }
}

/// Per-status queue counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Durable notification queue over the alert database.
pub struct NotificationQueue {
    db: Arc<AlertDb>,
    max_attempts: u32,
}

impl NotificationQueue {
    pub fn new(db: Arc<AlertDb>, max_attempts: u32) -> Self {
        Self { db, max_attempts }
    }

    /// Queue a single task.
    pub fn enqueue(&self, task: &NotificationTask) -> Result<()> {
        self.db.insert_task(task)?;
        tracing::debug!(
            "📬 Queued {} for {} (priority {})",
            task.notification_type,
            task.recipient,
            task.priority
        );
        Ok(())
    }

    /// Queue a batch; returns how many were queued.
    pub fn enqueue_batch(&self, tasks: &[NotificationTask]) -> Result<usize> {
        for task in tasks {
            self.db.insert_task(task)?;
        }
        if !tasks.is_empty() {
            tracing::info!("📬 Queued {} notification tasks", tasks.len());
        }
        Ok(tasks.len())
    }

    /// Up to `limit` pending tasks in (priority asc, created_at asc) order.
    pub fn dequeue_pending(&self, limit: usize) -> Result<Vec<NotificationTask>> {
        self.db.pending_tasks(limit)
    }

    /// Terminal success transition.
    pub fn mark_sent(&self, id: &str) -> Result<()> {
        self.db.mark_sent(id)
    }

    /// Failure transition: attempts + 1, terminal Failed once exhausted.
    pub fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        self.db.mark_failed(id, error, self.max_attempts)
    }

    pub fn stats(&self) -> Result<QueueStats> {
        self.db.queue_counts()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
