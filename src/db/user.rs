use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::{AppError, Res};
use crate::db::models::User;

pub async fn get_user_by_id(pool: &PgPool, user_id: Uuid) -> Res<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

pub async fn get_user_by_customer_id(pool: &PgPool, customer_id: &str) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE stripe_customer_id = $1")
        .bind(customer_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}

pub async fn set_stripe_customer_id(pool: &PgPool, user_id: Uuid, customer_id: &str) -> Res<()> {
    sqlx::query("UPDATE users SET stripe_customer_id = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(customer_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fields applied to the user row on a platform subscription-change event.
#[derive(Debug, Clone)]
pub struct PlatformSubscriptionUpdate {
    pub status: String,
    pub subscription_id: String,
    pub price_id: Option<String>,
    pub price_paid: Option<i64>,
    /// Start of the provider subscription this event belongs to. A fresh
    /// subscription after a cancellation carries a new start date, which
    /// restarts the withdrawal window.
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

pub async fn update_platform_subscription(
    pool: &PgPool,
    user_id: Uuid,
    update: &PlatformSubscriptionUpdate,
) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE users SET
            platform_subscription_status = $2,
            platform_subscription_id = $3,
            platform_price_id = $4,
            platform_price_paid = COALESCE($5, platform_price_paid),
            platform_subscription_expires_at = $6,
            platform_cancel_at_period_end = $7,
            platform_subscription_started_at =
                COALESCE($8, platform_subscription_started_at, now()),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(&update.status)
    .bind(&update.subscription_id)
    .bind(&update.price_id)
    .bind(update.price_paid)
    .bind(update.expires_at)
    .bind(update.cancel_at_period_end)
    .bind(update.started_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Terminal transition for a deleted platform subscription. Matching on the
/// provider subscription id keeps a stale delivery from clobbering a newer
/// subscription on the same user.
pub async fn clear_platform_subscription(
    pool: &PgPool,
    provider_subscription_id: &str,
) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE users SET
            platform_subscription_status = 'cancelled',
            platform_subscription_id = NULL,
            platform_price_id = NULL,
            platform_cancel_at_period_end = FALSE,
            updated_at = now()
        WHERE platform_subscription_id = $1
        "#,
    )
    .bind(provider_subscription_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_platform_cancel_at_period_end(
    pool: &PgPool,
    user_id: Uuid,
    cancel: bool,
) -> Res<()> {
    sqlx::query(
        "UPDATE users SET platform_cancel_at_period_end = $2, updated_at = now() WHERE id = $1",
    )
    .bind(user_id)
    .bind(cancel)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_platform_cancellation(
    pool: &PgPool,
    user_id: Uuid,
    reason: Option<&str>,
    feedback: Option<&str>,
) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE users SET
            platform_cancellation_reason = $2,
            platform_cancellation_feedback = $3,
            platform_cancelled_at = now(),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(reason)
    .bind(feedback)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn cancel_platform_now(pool: &PgPool, user_id: Uuid) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE users SET
            platform_subscription_status = 'cancelled',
            platform_cancel_at_period_end = FALSE,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}
