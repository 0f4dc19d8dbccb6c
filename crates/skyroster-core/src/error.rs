//! Error taxonomy for the alert engine.
//!
//! Failure classes map to how they are handled:
//! - `Source` fails the job that needed the read, nothing else.
//! - `Delivery` is recorded per task and retried, never escalated to job level.
//! - `Database` wraps any sqlite failure at the persistence boundary.

use thiserror::Error;

/// Convenience result type used throughout Skyroster.
pub type Result<T> = std::result::Result<T, SkyError>;

#[derive(Debug, Error)]
pub enum SkyError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Roster source error: {0}")]
    Source(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Job error: {0}")]
    Job(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
