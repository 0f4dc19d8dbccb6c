//! SQLite-backed persistence for the notification queue and send log.
//! Queue and dedup state survive restarts; a single connection behind a
//! mutex gives the single-writer discipline the queue relies on.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use skyroster_core::{Result, SkyError};

use crate::queue::{NotificationTask, QueueStats, TaskStatus};

/// SQLite store for notification tasks and the per-day send log.
pub struct AlertDb {
    conn: Mutex<Connection>,
}

impl AlertDb {
    /// Open or create the alert database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| SkyError::Database(format!("DB open: {e}")))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SkyError::Database(format!("DB open: {e}")))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            -- Pending and terminal notification tasks
            CREATE TABLE IF NOT EXISTS notification_queue (
                id TEXT PRIMARY KEY,
                recipient TEXT NOT NULL,
                notification_type TEXT NOT NULL,
                subject TEXT NOT NULL,
                template_name TEXT NOT NULL,
                template_data TEXT NOT NULL,     -- JSON payload
                priority INTEGER NOT NULL DEFAULT 3,
                status TEXT NOT NULL DEFAULT 'pending',  -- pending, sent, failed
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                sent_at TEXT,
                last_error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_queue_drain
                ON notification_queue (status, priority, created_at);

            -- One row per (type, calendar day) alert wave
            CREATE TABLE IF NOT EXISTS send_log (
                notification_type TEXT NOT NULL,
                sent_date TEXT NOT NULL,         -- YYYY-MM-DD
                created_at TEXT NOT NULL,
                PRIMARY KEY (notification_type, sent_date)
            );
            ",
        )
        .map_err(|e| SkyError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Notification queue ──────────────────────────────────

    /// Insert a task. `created_at` is taken from the task so retries and
    /// tests can back-date rows.
    pub fn insert_task(&self, task: &NotificationTask) -> Result<()> {
        self.lock()
            .execute(
                "INSERT INTO notification_queue
                 (id, recipient, notification_type, subject, template_name, template_data,
                  priority, status, attempts, created_at, sent_at, last_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    task.id,
                    task.recipient,
                    task.notification_type,
                    task.subject,
                    task.template_name,
                    task.template_data.to_string(),
                    task.priority,
                    task.status.as_str(),
                    task.attempts,
                    task.created_at.to_rfc3339(),
                    task.sent_at.map(|t| t.to_rfc3339()),
                    task.last_error,
                ],
            )
            .map_err(|e| SkyError::Database(format!("Insert task: {e}")))?;
        Ok(())
    }

    /// Pending tasks in drain order: priority ascending, then FIFO.
    pub fn pending_tasks(&self, limit: usize) -> Result<Vec<NotificationTask>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, recipient, notification_type, subject, template_name, template_data,
                        priority, status, attempts, created_at, sent_at, last_error
                 FROM notification_queue
                 WHERE status = 'pending'
                 ORDER BY priority ASC, created_at ASC
                 LIMIT ?1",
            )
            .map_err(|e| SkyError::Database(format!("Prepare pending: {e}")))?;

        let rows = stmt
            .query_map([limit as i64], task_from_row)
            .map_err(|e| SkyError::Database(format!("Query pending: {e}")))?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(|e| SkyError::Database(format!("Read task row: {e}")))?);
        }
        Ok(tasks)
    }

    /// Mark a task sent (terminal).
    pub fn mark_sent(&self, id: &str) -> Result<()> {
        self.lock()
            .execute(
                "UPDATE notification_queue
                 SET status = 'sent', sent_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                rusqlite::params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| SkyError::Database(format!("Mark sent: {e}")))?;
        Ok(())
    }

    /// Record a failed attempt. The task stays pending until `max_attempts`
    /// is reached, then goes terminal failed.
    pub fn mark_failed(&self, id: &str, error: &str, max_attempts: u32) -> Result<()> {
        self.lock()
            .execute(
                "UPDATE notification_queue
                 SET attempts = attempts + 1,
                     last_error = ?1,
                     status = CASE WHEN attempts + 1 >= ?2 THEN 'failed' ELSE 'pending' END
                 WHERE id = ?3 AND status = 'pending'",
                rusqlite::params![error, max_attempts, id],
            )
            .map_err(|e| SkyError::Database(format!("Mark failed: {e}")))?;
        Ok(())
    }

    /// Fetch a task by id.
    pub fn get_task(&self, id: &str) -> Result<Option<NotificationTask>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, recipient, notification_type, subject, template_name, template_data,
                        priority, status, attempts, created_at, sent_at, last_error
                 FROM notification_queue WHERE id = ?1",
            )
            .map_err(|e| SkyError::Database(format!("Prepare get: {e}")))?;
        let mut rows = stmt
            .query_map([id], task_from_row)
            .map_err(|e| SkyError::Database(format!("Query get: {e}")))?;
        match rows.next() {
            Some(row) => Ok(Some(
                row.map_err(|e| SkyError::Database(format!("Read task row: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    /// Per-status queue counts.
    pub fn queue_counts(&self) -> Result<QueueStats> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM notification_queue GROUP BY status")
            .map_err(|e| SkyError::Database(format!("Prepare counts: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| SkyError::Database(format!("Query counts: {e}")))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) =
                row.map_err(|e| SkyError::Database(format!("Read count row: {e}")))?;
            match status.as_str() {
                "pending" => stats.pending = count as usize,
                "sent" => stats.sent = count as usize,
                "failed" => stats.failed = count as usize,
                _ => {}
            }
        }
        Ok(stats)
    }

    // ─── Send log ────────────────────────────────────────────

    /// Has an alert wave of this type already fired on this date?
    pub fn send_log_exists(&self, notification_type: &str, date: NaiveDate) -> Result<bool> {
        let count: i64 = self
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM send_log WHERE notification_type = ?1 AND sent_date = ?2",
                rusqlite::params![notification_type, date.format("%Y-%m-%d").to_string()],
                |row| row.get(0),
            )
            .map_err(|e| SkyError::Database(format!("Query send log: {e}")))?;
        Ok(count > 0)
    }

    /// Record that a wave fired. INSERT OR IGNORE keeps a double invocation
    /// of the same tick from erroring.
    pub fn send_log_insert(&self, notification_type: &str, date: NaiveDate) -> Result<()> {
        self.lock()
            .execute(
                "INSERT OR IGNORE INTO send_log (notification_type, sent_date, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    notification_type,
                    date.format("%Y-%m-%d").to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| SkyError::Database(format!("Insert send log: {e}")))?;
        Ok(())
    }

    // ─── Retention ───────────────────────────────────────────

    /// Delete send-log rows and terminal tasks created before `cutoff`.
    /// Pending tasks are never touched. Returns (log_removed, tasks_removed).
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<(usize, usize)> {
        let conn = self.lock();
        let cutoff_str = cutoff.to_rfc3339();
        let log_removed = conn
            .execute(
                "DELETE FROM send_log WHERE created_at < ?1",
                rusqlite::params![cutoff_str],
            )
            .map_err(|e| SkyError::Database(format!("Purge send log: {e}")))?;
        let tasks_removed = conn
            .execute(
                "DELETE FROM notification_queue
                 WHERE status IN ('sent', 'failed') AND created_at < ?1",
                rusqlite::params![cutoff_str],
            )
            .map_err(|e| SkyError::Database(format!("Purge queue: {e}")))?;
        Ok((log_removed, tasks_removed))
    }
}

/// Map a full queue row to a task.
fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationTask> {
    let template_data_str: String = row.get(5)?;
    let status_str: String = row.get(7)?;
    let created_at_str: String = row.get(9)?;
    let sent_at_str: Option<String> = row.get(10)?;

    Ok(NotificationTask {
        id: row.get(0)?,
        recipient: row.get(1)?,
        notification_type: row.get(2)?,
        subject: row.get(3)?,
        template_name: row.get(4)?,
        template_data: serde_json::from_str(&template_data_str).unwrap_or_default(),
        priority: row.get(6)?,
        status: TaskStatus::parse(&status_str),
        attempts: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        sent_at: sent_at_str
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        last_error: row.get(11)?,
    })
}
