use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::{AppError, Res};
use crate::db::models::ProfessorSubscription;

pub async fn get_professor_subscription(
    pool: &PgPool,
    user_id: Uuid,
    professor_id: Uuid,
) -> Res<Option<ProfessorSubscription>> {
    sqlx::query_as::<_, ProfessorSubscription>(
        "SELECT * FROM professor_subscriptions WHERE user_id = $1 AND professor_id = $2",
    )
    .bind(user_id)
    .bind(professor_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)
}

pub async fn list_professor_subscriptions(
    pool: &PgPool,
    user_id: Uuid,
) -> Res<Vec<ProfessorSubscription>> {
    sqlx::query_as::<_, ProfessorSubscription>(
        "SELECT * FROM professor_subscriptions WHERE user_id = $1 ORDER BY started_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from)
}

/// Fields applied on a professor subscription-change event.
#[derive(Debug, Clone)]
pub struct ProfessorSubscriptionUpdate {
    pub user_id: Uuid,
    pub professor_id: Uuid,
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

/// Upserts the per-professor subscription row. Replayed events land on the
/// (user, professor) unique key and overwrite with the same values; the start
/// date follows the provider subscription, so a resubscription resets it.
pub async fn upsert_professor_subscription(
    pool: &PgPool,
    update: &ProfessorSubscriptionUpdate,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO professor_subscriptions
            (user_id, professor_id, stripe_subscription_id, stripe_price_id,
             price_paid, status, started_at, expires_at, cancel_at_period_end)
        VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, now()), $8, $9)
        ON CONFLICT (user_id, professor_id) DO UPDATE SET
            stripe_subscription_id = EXCLUDED.stripe_subscription_id,
            stripe_price_id = EXCLUDED.stripe_price_id,
            price_paid = COALESCE(EXCLUDED.price_paid, professor_subscriptions.price_paid),
            status = EXCLUDED.status,
            started_at = COALESCE(EXCLUDED.started_at, professor_subscriptions.started_at),
            expires_at = EXCLUDED.expires_at,
            cancel_at_period_end = EXCLUDED.cancel_at_period_end
        "#,
    )
    .bind(update.user_id)
    .bind(update.professor_id)
    .bind(&update.subscription_id)
    .bind(&update.price_id)
    .bind(update.price_paid)
    .bind(&update.status)
    .bind(update.started_at)
    .bind(update.expires_at)
    .bind(update.cancel_at_period_end)
    .execute(pool)
    .await?;
    Ok(())
}

/// Terminal transition for a deleted professor subscription, scoped to the
/// provider subscription id so platform fields stay untouched.
pub async fn clear_professor_subscription(
    pool: &PgPool,
    provider_subscription_id: &str,
) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE professor_subscriptions SET
            status = 'cancelled',
            stripe_subscription_id = NULL,
            stripe_price_id = NULL,
            cancel_at_period_end = FALSE
        WHERE stripe_subscription_id = $1
        "#,
    )
    .bind(provider_subscription_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_cancel_at_period_end(
    pool: &PgPool,
    subscription_row_id: Uuid,
    cancel: bool,
) -> Res<()> {
    sqlx::query("UPDATE professor_subscriptions SET cancel_at_period_end = $2 WHERE id = $1")
        .bind(subscription_row_id)
        .bind(cancel)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_cancellation(
    pool: &PgPool,
    subscription_row_id: Uuid,
    reason: Option<&str>,
    feedback: Option<&str>,
) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE professor_subscriptions SET
            cancellation_reason = $2,
            cancellation_feedback = $3,
            cancelled_at = now()
        WHERE id = $1
        "#,
    )
    .bind(subscription_row_id)
    .bind(reason)
    .bind(feedback)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn cancel_now(pool: &PgPool, subscription_row_id: Uuid) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE professor_subscriptions SET
            status = 'cancelled',
            cancel_at_period_end = FALSE
        WHERE id = $1
        "#,
    )
    .bind(subscription_row_id)
    .execute(pool)
    .await?;
    Ok(())
}
