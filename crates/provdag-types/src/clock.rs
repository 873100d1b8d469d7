use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch according to the local wall clock.
///
/// Block timestamps are producer-assigned; nothing in the DAG relies on
/// clocks being synchronized across producers.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
