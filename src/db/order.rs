use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::{AppError, Res};
use crate::db::models::{Order, OrderItem};

/// Transitions a pending order to paid and returns it. Replays and orders in
/// any other state return `None`, so stock is only ever touched once.
pub async fn mark_paid(pool: &PgPool, order_id: Uuid) -> Res<Option<Order>> {
    sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET status = 'paid', updated_at = now()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)
}

/// Transitions a pending order to cancelled and returns it (None on replay).
pub async fn mark_cancelled(pool: &PgPool, order_id: Uuid) -> Res<Option<Order>> {
    sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET status = 'cancelled', updated_at = now()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)
}

pub async fn get_items(pool: &PgPool, order_id: Uuid) -> Res<Vec<OrderItem>> {
    sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)
}

/// Permanently removes paid-for units from stock and drops the matching
/// reservation hold.
pub async fn commit_stock(pool: &PgPool, product_id: Uuid, quantity: i32) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE products
        SET stock = GREATEST(stock - $2, 0),
            reserved = GREATEST(reserved - $2, 0)
        WHERE id = $1
        "#,
    )
    .bind(product_id)
    .bind(quantity)
    .execute(pool)
    .await?;
    Ok(())
}

/// Releases a reservation hold without touching stock (cancelled order).
pub async fn release_reservation(pool: &PgPool, product_id: Uuid, quantity: i32) -> Res<()> {
    sqlx::query("UPDATE products SET reserved = GREATEST(reserved - $2, 0) WHERE id = $1")
        .bind(product_id)
        .bind(quantity)
        .execute(pool)
        .await?;
    Ok(())
}

/// Converts the pending ticket holds attached to a checkout session into
/// confirmed attendees. Already-confirmed holds are left alone.
pub async fn confirm_ticket_holds(pool: &PgPool, checkout_session_id: &str) -> Res<u64> {
    let result = sqlx::query(
        r#"
        UPDATE event_ticket_holds
        SET status = 'confirmed'
        WHERE checkout_session_id = $1 AND status = 'pending'
        "#,
    )
    .bind(checkout_session_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Same conversion, for holds attached to an order.
pub async fn confirm_ticket_holds_for_order(pool: &PgPool, order_id: Uuid) -> Res<u64> {
    let result = sqlx::query(
        r#"
        UPDATE event_ticket_holds
        SET status = 'confirmed'
        WHERE order_id = $1 AND status = 'pending'
        "#,
    )
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
