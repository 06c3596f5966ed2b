//! Utility functions

use std::time::Duration;

/// Format a duration into (minutes, seconds) tuple
#[inline]
pub fn format_duration(dur: Duration) -> (u64, u64) {
    let secs = dur.as_secs();
    (secs / 60, secs % 60)
}

/// Format duration as a human-readable string
#[inline]
pub fn format_duration_verbose(dur: Duration) -> String {
    let (mins, secs) = format_duration(dur);
    if mins > 0 {
        format!("{mins} min {secs} sec")
    } else {
        format!("{:.1} sec", dur.as_secs_f64())
    }
}

/// Percentage of `part` in `total`, 0 when `total` is 0
#[inline]
pub fn percent(part: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { 100.0 * part as f64 / total as f64 }
}
