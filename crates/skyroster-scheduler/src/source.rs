//! Roster data source — the engine's read-only view of pilots,
//! certifications, and administrative users.
//!
//! The roster database is owned elsewhere; this module only queries it. The
//! trait seam lets jobs run against an in-memory fake in tests.

use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::Connection;

use skyroster_core::{Result, SkyError};

use crate::recipients::{NotificationPrefs, Recipient};
use crate::thresholds::TrackedExpiry;

/// Read path into the roster records.
pub trait RosterSource: Send + Sync {
    /// Active certification rows with a non-null expiry date at or after
    /// `as_of`. Already-expired rows are excluded at the query.
    fn active_expiries(&self, as_of: NaiveDate) -> Result<Vec<TrackedExpiry>>;

    /// Administrative users who may receive alerts, with their preferences.
    fn alert_recipients(&self) -> Result<Vec<Recipient>>;
}

/// Read-only sqlite implementation over the roster database.
pub struct SqliteRosterSource {
    conn: Mutex<Connection>,
}

impl SqliteRosterSource {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .map_err(|e| SkyError::Source(format!("Roster DB open: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RosterSource for SqliteRosterSource {
    fn active_expiries(&self, as_of: NaiveDate) -> Result<Vec<TrackedExpiry>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT p.id, p.name, ct.code, ct.category, pc.expiry_date
                 FROM pilot_checks pc
                 JOIN pilots p ON p.id = pc.pilot_id
                 JOIN check_types ct ON ct.id = pc.check_type_id
                 WHERE p.active = 1
                   AND pc.expiry_date IS NOT NULL
                   AND pc.expiry_date >= ?1
                 ORDER BY pc.expiry_date",
            )
            .map_err(|e| SkyError::Source(format!("Prepare expiries: {e}")))?;

        let rows = stmt
            .query_map([as_of.format("%Y-%m-%d").to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| SkyError::Source(format!("Query expiries: {e}")))?;

        let mut expiries = Vec::new();
        for row in rows {
            let (pilot_id, pilot_name, check_code, category, expiry_str) =
                row.map_err(|e| SkyError::Source(format!("Read expiry row: {e}")))?;
            let Ok(expiry_date) = NaiveDate::parse_from_str(&expiry_str, "%Y-%m-%d") else {
                tracing::warn!("⚠️ Bad expiry date '{expiry_str}' for pilot {pilot_id}, skipped");
                continue;
            };
            expiries.push(TrackedExpiry {
                pilot_id,
                pilot_name,
                check_code,
                category,
                expiry_date,
            });
        }
        Ok(expiries)
    }

    fn alert_recipients(&self) -> Result<Vec<Recipient>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT email, name, notification_prefs
                 FROM users
                 WHERE role IN ('admin', 'manager')
                 ORDER BY email",
            )
            .map_err(|e| SkyError::Source(format!("Prepare recipients: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(|e| SkyError::Source(format!("Query recipients: {e}")))?;

        let mut recipients = Vec::new();
        for row in rows {
            let (email, name, prefs_json) =
                row.map_err(|e| SkyError::Source(format!("Read recipient row: {e}")))?;
            let prefs: NotificationPrefs = prefs_json
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();
            recipients.push(Recipient { email, name, prefs });
        }
        Ok(recipients)
    }
}
