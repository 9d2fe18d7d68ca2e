use std::sync::Arc;

use actix_web::{Responder, post, web};
use chrono::Utc;
use sqlx::PgPool;

use crate::api_media::dtos::token::{StreamTokenRequest, StreamTokenResponse};
use crate::api_media::services::access::{self, Access, Content, Viewer, Visibility};
use crate::api_media::services::stream::{self, StreamClient};
use crate::common::{env_config::Config, error::{AppError, Res}, http::Success, jwt::Claims};
use crate::db;

/// Issues a short-lived signed streaming token for a video the caller may
/// watch.
///
/// # Output
/// - `200 {token, videoId, expiresAt, expiresIn}`
/// - `403` when the access decision is locked
/// - `404` when the video does not exist
/// - `500` when the streaming provider is not configured
#[post("/stream-token")]
async fn post_stream_token(
    claims: web::ReqData<Claims>,
    req: web::Json<StreamTokenRequest>,
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let video = db::catalog::get_video(&pool, req.video_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Video {} not found", req.video_id)))?;

    let viewer = build_viewer(&pool, &claims, &video).await?;
    let content = Content {
        author_id: video.professor_id,
        visibility: Visibility::parse(&video.visibility),
        program_id: video.program_id,
    };

    if access::decide(&viewer, &content, Utc::now()) == Access::Locked {
        return Err(AppError::Forbidden(
            "You do not have access to this video".to_string(),
        ));
    }

    let (account_id, api_token) = match (&config.stream_account_id, &config.stream_api_token) {
        (Some(account_id), Some(api_token)) => (account_id.clone(), api_token.clone()),
        _ => {
            return Err(AppError::Config(
                "Streaming provider credentials are not configured".to_string(),
            ));
        }
    };

    let stream_uid = video
        .stream_uid
        .clone()
        .unwrap_or_else(|| video.id.to_string());
    let expires_at = Utc::now().timestamp() + stream::TOKEN_TTL_SECS;

    let client = StreamClient::new(account_id, api_token);
    let token = client.issue_playback_token(&stream_uid, expires_at).await?;

    Success::ok(StreamTokenResponse {
        token,
        video_id: video.id,
        expires_at,
        expires_in: stream::TOKEN_TTL_SECS,
    })
}

/// Snapshot of the caller's records the access decision needs.
async fn build_viewer(
    pool: &PgPool,
    claims: &Claims,
    video: &crate::db::models::Video,
) -> Res<Viewer> {
    let user = db::user::get_user_by_id(pool, claims.user_id).await?;

    let subscribed_professors = db::subscription::list_professor_subscriptions(pool, user.id)
        .await?
        .into_iter()
        .filter(|sub| sub.status == "active")
        .map(|sub| sub.professor_id)
        .collect();

    let purchased_item = db::purchase::has_active_purchase(pool, user.id, "video", video.id).await?;
    let purchased_program = match video.program_id {
        Some(program_id) => {
            db::purchase::has_active_purchase(pool, user.id, "program", program_id).await?
        }
        None => false,
    };

    Ok(Viewer {
        user_id: user.id,
        is_admin: user.role == "admin",
        platform_subscription_active: user.platform_subscription_status.as_deref()
            == Some("active"),
        platform_subscription_expires_at: user.platform_subscription_expires_at,
        subscribed_professors,
        purchased_item,
        purchased_program,
    })
}
