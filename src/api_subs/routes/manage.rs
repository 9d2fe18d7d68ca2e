use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use sqlx::PgPool;

use crate::api_subs::{
    dtos::manage::{CurrentSubscriptionsResponse, ManageRequest, PlatformSubscriptionView},
    services,
};
use crate::common::{env_config::Config, error::Res, http::Success, jwt::Claims, stripe};
use crate::db;

/// Cancels or reactivates one of the user's subscriptions.
///
/// # Input
/// - `claims`: validated bearer-token claims
/// - `req`: JSON payload with `action` (`cancel` | `reactivate`),
///   `subscription_type` (`platform` | `professor`), optional
///   `professor_id`, cancellation reason/feedback and `request_refund`
///
/// # Output
/// - `200 {success, message, refund_processed?, refund_id?}`
/// - `404` when no active subscription exists for the requested scope
/// - `400` when a refund is requested but not available (waived or window
///   expired); the subscription is left untouched in that case
#[post("/manage")]
async fn post_manage(
    claims: web::ReqData<Claims>,
    req: web::Json<ManageRequest>,
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let client = stripe::create_client(&config.stripe_secret_key);

    let response =
        services::lifecycle::manage(&pool, &client, &claims, req.into_inner()).await?;

    Success::ok(response)
}

/// Returns the user's current subscription state for the account page.
#[get("/current")]
async fn get_current(
    claims: web::ReqData<Claims>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let user = db::user::get_user_by_id(&pool, claims.user_id).await?;
    let professors = db::subscription::list_professor_subscriptions(&pool, claims.user_id).await?;

    Success::ok(CurrentSubscriptionsResponse {
        platform: PlatformSubscriptionView {
            status: user.platform_subscription_status,
            expires_at: user.platform_subscription_expires_at,
            cancel_at_period_end: user.platform_cancel_at_period_end,
        },
        professors,
    })
}
