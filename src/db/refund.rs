use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::Res;

/// Records a refund that the payment provider actually issued.
#[allow(clippy::too_many_arguments)]
pub async fn insert_refund(
    pool: &PgPool,
    user_id: Uuid,
    subscription_type: &str,
    subscription_id: &str,
    amount: i64,
    reason: Option<&str>,
    status: &str,
    provider_refund_id: &str,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO refunds
            (user_id, subscription_type, subscription_id, amount, reason,
             status, provider_refund_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(user_id)
    .bind(subscription_type)
    .bind(subscription_id)
    .bind(amount)
    .bind(reason)
    .bind(status)
    .bind(provider_refund_id)
    .execute(pool)
    .await?;
    Ok(())
}
