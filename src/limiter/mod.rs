//! Record-store-backed request limiter.
//!
//! One counting window per `actor:scope` key, persisted in the `rate_limits`
//! table so every instance of the service shares the same counters. A store
//! error propagates to the caller as a service failure, never as a denial.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::Res;
use crate::db::models::RateLimitRecord;
use crate::db::rate_limit;

pub const MAX_REQUESTS: i32 = 10;
pub const WINDOW_SECS: i64 = 60;

#[derive(Debug, PartialEq, Eq)]
enum WindowAction {
    /// No usable window: open a fresh one with count 1 and allow.
    Start,
    /// Window has room: bump the counter and allow.
    Increment,
    /// Counter is full for this window.
    Deny,
}

fn decide(existing: Option<&RateLimitRecord>, now: DateTime<Utc>) -> WindowAction {
    match existing {
        None => WindowAction::Start,
        Some(record) if record.expires_at <= now => WindowAction::Start,
        Some(record) if record.count < MAX_REQUESTS => WindowAction::Increment,
        Some(_) => WindowAction::Deny,
    }
}

/// Returns whether `user_id` may perform another `scope` request right now.
pub async fn allow(pool: &PgPool, user_id: Uuid, scope: &str) -> Res<bool> {
    let key = format!("{}:{}", user_id, scope);
    let now = Utc::now();

    let record = rate_limit::get_record(pool, &key).await?;
    match decide(record.as_ref(), now) {
        WindowAction::Start => {
            rate_limit::start_window(pool, &key, now, now + Duration::seconds(WINDOW_SECS)).await?;
            Ok(true)
        }
        WindowAction::Increment => {
            rate_limit::increment(pool, &key).await?;
            Ok(true)
        }
        WindowAction::Deny => {
            log::warn!("Rate limit hit for {}", key);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(count: i32, expires_in_secs: i64, now: DateTime<Utc>) -> RateLimitRecord {
        RateLimitRecord {
            key: "user:checkout".to_string(),
            count,
            window_start: now - Duration::seconds(WINDOW_SECS - expires_in_secs),
            expires_at: now + Duration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn first_request_starts_a_window() {
        assert_eq!(decide(None, Utc::now()), WindowAction::Start);
    }

    #[test]
    fn tenth_request_is_allowed_eleventh_is_denied() {
        let now = Utc::now();
        let ninth = record(9, 30, now);
        assert_eq!(decide(Some(&ninth), now), WindowAction::Increment);

        let tenth = record(10, 30, now);
        assert_eq!(decide(Some(&tenth), now), WindowAction::Deny);
    }

    #[test]
    fn expired_window_resets_the_counter() {
        let now = Utc::now();
        let stale = record(MAX_REQUESTS, -1, now);
        assert_eq!(decide(Some(&stale), now), WindowAction::Start);
    }
}
