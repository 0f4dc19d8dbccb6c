//! # Skyroster Scheduler
//!
//! Scheduled-job and notification-dispatch engine for pilot certification
//! expiries. Scans time-sensitive records, decides once per day per alert
//! type whether a wave is due, queues prioritized notification tasks, drains
//! them through the delivery channel with retry, and reclaims storage.
//!
//! ## Design Principles
//! - SQLite persistence — queue and send log survive restarts
//! - One alert wave per (type, calendar day) — safe to trigger redundantly
//! - Priority-ordered drain — urgent alerts are never starved by backlog
//! - Per-task failure isolation — one bad send never aborts a batch
//!
//! ## Architecture
//! ```text
//! JobRunner (tokio interval or manual trigger)
//!   ├── ExpiryCheck: ThresholdEvaluator → DedupGuard → RecipientResolver
//!   │                  → NotificationQueue.enqueue_batch
//!   ├── QueueDrain:  dequeue_pending → DeliveryChannel (SMTP)
//!   │                  → mark_sent / mark_failed (retry up to max_attempts)
//!   └── Cleanup:     purge old send-log rows + terminal tasks, sweep cache
//!
//! TtlCache sits beside the evaluator — read-heavy roster aggregates are
//! cached per tick and invalidated by external collaborators on mutation.
//! ```

pub mod cache;
pub mod dedup;
pub mod dispatch;
pub mod jobs;
pub mod persistence;
pub mod queue;
pub mod recipients;
pub mod source;
pub mod sweeper;
pub mod thresholds;

pub use cache::{CacheStats, TtlCache};
pub use dedup::DedupGuard;
pub use dispatch::{DeliveryChannel, SmtpChannel};
pub use jobs::{JobKind, JobResult, JobRunner, ProcessStats};
pub use persistence::AlertDb;
pub use queue::{NotificationQueue, NotificationTask, QueueStats, TaskStatus};
pub use recipients::{NotificationPrefs, Recipient};
pub use source::{RosterSource, SqliteRosterSource};
pub use sweeper::{CleanupSweeper, SweepStats};
pub use thresholds::{AlertThresholds, CandidateAlert, TrackedExpiry};
