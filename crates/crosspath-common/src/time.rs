//! Epoch-millisecond clock.
//!
//! All presence and pairing timestamps are plain epoch millis; callers pass
//! `now` explicitly into the matching paths so the recency window is
//! testable without a real clock.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
