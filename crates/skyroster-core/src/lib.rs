//! Skyroster core — configuration and shared error types.

pub mod config;
pub mod error;

pub use config::SkyrosterConfig;
pub use error::{Result, SkyError};
