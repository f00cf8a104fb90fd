//! Sending-window policy

/// True iff `start_hour <= now_hour < end_hour`.
///
/// Windows do not wrap midnight: `start > end` and `start == end` are both
/// closed for every hour.
pub fn is_within_window(now_hour: u32, start_hour: i32, end_hour: i32) -> bool {
    let now_hour = now_hour as i64;
    (start_hour as i64) <= now_hour && now_hour < (end_hour as i64)
}
