use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::{AppError, Res};
use crate::db::models::CheckoutSession;

#[allow(clippy::too_many_arguments)]
pub async fn insert_pending_session(
    pool: &PgPool,
    session_id: &str,
    user_id: Uuid,
    payment_type: &str,
    target_id: Option<&str>,
    amount: i64,
    currency: &str,
    expires_at: DateTime<Utc>,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO checkout_sessions
            (id, user_id, payment_type, target_id, amount, currency, status, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .bind(payment_type)
    .bind(target_id)
    .bind(amount)
    .bind(currency)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks the session completed and returns the row, but only on the first
/// transition. A replayed completion event gets `None` and applies nothing.
pub async fn complete_session(pool: &PgPool, session_id: &str) -> Res<Option<CheckoutSession>> {
    sqlx::query_as::<_, CheckoutSession>(
        r#"
        UPDATE checkout_sessions
        SET status = 'completed'
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)
}
