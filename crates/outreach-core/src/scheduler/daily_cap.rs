//! Daily send cap accounting

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use outreach_common::Result;
use outreach_storage::models::Campaign;
use outreach_storage::repository::RecipientRepository;

/// Local midnight at the start of `now`'s calendar day, as UTC
pub fn local_midnight(now: DateTime<Local>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(start) => start.with_timezone(&Utc),
        // Midnight skipped by a DST change; the day starts at the first valid instant
        None => now.with_timezone(&Utc) - (now.naive_local() - midnight),
    }
}

/// Sends still allowed today: `max(0, daily_limit - sent_today)`
pub fn remaining(daily_limit: i32, sent_today: i64) -> u32 {
    (daily_limit as i64 - sent_today).max(0) as u32
}

/// Count today's sends for a campaign and return what is left of its cap.
///
/// Always queries the store; nothing is cached between passes.
pub async fn remaining_today(
    recipients: &dyn RecipientRepository,
    campaign: &Campaign,
    now: DateTime<Local>,
) -> Result<u32> {
    let sent_today = recipients
        .count_sent_since(campaign.id, local_midnight(now))
        .await?;
    Ok(remaining(campaign.daily_limit, sent_today))
}
