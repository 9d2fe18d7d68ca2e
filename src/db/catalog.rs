use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::{AppError, Res};
use crate::db::models::Video;

pub async fn get_video(pool: &PgPool, video_id: Uuid) -> Res<Option<Video>> {
    sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = $1")
        .bind(video_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}
