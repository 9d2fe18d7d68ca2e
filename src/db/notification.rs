use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::Res;

pub async fn insert_notification(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    body: &str,
    priority: &str,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (user_id, title, body, priority)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(title)
    .bind(body)
    .bind(priority)
    .execute(pool)
    .await?;
    Ok(())
}
