use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::error::{AppError, Res};
use crate::db::models::RateLimitRecord;

pub async fn get_record(pool: &PgPool, key: &str) -> Res<Option<RateLimitRecord>> {
    sqlx::query_as::<_, RateLimitRecord>("SELECT * FROM rate_limits WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}

/// Opens a fresh window with count 1, replacing any previous (expired) one.
pub async fn start_window(
    pool: &PgPool,
    key: &str,
    window_start: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO rate_limits (key, count, window_start, expires_at)
        VALUES ($1, 1, $2, $3)
        ON CONFLICT (key) DO UPDATE SET
            count = 1,
            window_start = EXCLUDED.window_start,
            expires_at = EXCLUDED.expires_at
        "#,
    )
    .bind(key)
    .bind(window_start)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn increment(pool: &PgPool, key: &str) -> Res<()> {
    sqlx::query("UPDATE rate_limits SET count = count + 1 WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}
