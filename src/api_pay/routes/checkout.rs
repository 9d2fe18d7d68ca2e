use std::sync::Arc;

use actix_web::{Responder, post, web};

use crate::api_pay::{dtos::checkout::CheckoutRequest, services};
use crate::common::{env_config::Config, error::Res, http::Success, jwt::Claims, stripe};
use sqlx::PgPool;

/// Creates a provider checkout session for the authenticated user.
///
/// # Input
/// - `claims`: validated bearer-token claims
/// - `req`: JSON payload matching `CheckoutRequest`
///
/// # Output
/// - `200 {sessionId, url}` on success
/// - `400 {error, details}` when validation fails (all violations listed)
/// - `429 {error}` with `Retry-After: 60` when the rate limit is hit
#[post("/checkout")]
async fn post_checkout(
    claims: web::ReqData<Claims>,
    req: web::Json<CheckoutRequest>,
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let client = stripe::create_client(&config.stripe_secret_key);

    let response =
        services::checkout::create_checkout(&pool, &client, &claims, req.into_inner()).await?;

    Success::ok(response)
}
