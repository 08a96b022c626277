//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Format used in ledger file names (e.g. `2025_03_14_091502`)
pub const FILE_STAMP_FORMAT: &str = "%Y_%m_%d_%H%M%S";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Render a timestamp for use inside a file name
pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.format(FILE_STAMP_FORMAT).to_string()
}
