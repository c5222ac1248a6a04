use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

// Microsecond timestamp of the last id handed out by this process.
static LAST_ISSUED_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Mints a batch id such as `batch_20250101_120000_123456`.
///
/// Ids come from the wall clock at microsecond resolution. Two calls inside
/// the same microsecond, or a clock that steps backwards, get the next free
/// microsecond instead, so ids never repeat within a process.
pub fn new_batch_id() -> String {
    let now = Utc::now().timestamp_micros();
    let bump = |prev: i64| now.max(prev.saturating_add(1));
    let prev = match LAST_ISSUED_MICROS.fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
        Some(bump(prev))
    }) {
        Ok(prev) | Err(prev) => prev,
    };
    format_batch_id(bump(prev))
}

fn format_batch_id(micros: i64) -> String {
    let at = DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_default();
    format!("batch_{}", at.format("%Y%m%d_%H%M%S_%6f"))
}
