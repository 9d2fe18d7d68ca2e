use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::{AppError, Res};
use crate::db::models::Payment;

#[allow(clippy::too_many_arguments)]
pub async fn insert_payment(
    pool: &PgPool,
    user_id: Option<Uuid>,
    payment_intent_id: Option<&str>,
    checkout_session_id: Option<&str>,
    order_id: Option<Uuid>,
    amount: i64,
    currency: &str,
    payment_type: &str,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (user_id, payment_intent_id, checkout_session_id, order_id,
             amount, currency, payment_type, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
        ON CONFLICT (payment_intent_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(payment_intent_id)
    .bind(checkout_session_id)
    .bind(order_id)
    .bind(amount)
    .bind(currency)
    .bind(payment_type)
    .execute(pool)
    .await?;
    Ok(())
}

/// Updates the payment row matching a provider payment-intent id and returns
/// it, or `None` when no such payment is known.
pub async fn set_status_by_intent(
    pool: &PgPool,
    payment_intent_id: &str,
    status: &str,
) -> Res<Option<Payment>> {
    sqlx::query_as::<_, Payment>(
        "UPDATE payments SET status = $2 WHERE payment_intent_id = $1 RETURNING *",
    )
    .bind(payment_intent_id)
    .bind(status)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)
}
