use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::{AppError, Res};

/// Inserts a purchase unless one already exists for (user, item, target).
/// Returns whether a row was actually created.
pub async fn insert_purchase_if_absent(
    pool: &PgPool,
    user_id: Uuid,
    item_type: &str,
    target_id: Uuid,
    amount_paid: i64,
) -> Res<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO purchases (user_id, item_type, target_id, amount_paid, status)
        VALUES ($1, $2, $3, $4, 'active')
        ON CONFLICT (user_id, item_type, target_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(item_type)
    .bind(target_id)
    .bind(amount_paid)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn has_active_purchase(
    pool: &PgPool,
    user_id: Uuid,
    item_type: &str,
    target_id: Uuid,
) -> Res<bool> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM purchases
            WHERE user_id = $1 AND item_type = $2 AND target_id = $3 AND status = 'active'
        )
        "#,
    )
    .bind(user_id)
    .bind(item_type)
    .bind(target_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from)
}
