//! Wall-clock helpers shared by the credential store, cooldown tracker and
//! affinity map, all of which reason about absolute millisecond timestamps.

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
