//! Utility modules for the backup engine.

pub mod errors;
pub mod logger;

pub use errors::{EngineError, Result};

use chrono::Utc;

/// Current wall-clock time as unix milliseconds. All sync-state timestamps
/// and payload envelopes use this resolution.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
