use sqlx::PgPool;

use crate::common::error::Res;
use crate::db::models::Log;

pub async fn insert_log(pool: &PgPool, entry: Log) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO request_logs
            (timestamp, method, path, status_code, user_id, params,
             request_body, response_body, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.timestamp)
    .bind(&entry.method)
    .bind(&entry.path)
    .bind(entry.status_code)
    .bind(entry.user_id)
    .bind(&entry.params)
    .bind(&entry.request_body)
    .bind(&entry.response_body)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .execute(pool)
    .await?;
    Ok(())
}
