use std::sync::Arc;

use actix_web::{HttpResponse, Responder, post, web};

use crate::api_pay::services;
use crate::common::{env_config::Config, error::{AppError, Res}, stripe};
use sqlx::PgPool;

/// Handles Stripe webhook events for payment processing.
///
/// This endpoint is called by Stripe's servers, not by the frontend. The raw
/// body is verified against the `stripe-signature` header; a bad signature is
/// a 400. Once an event is verified, processing failures are logged and the
/// provider still gets a 200, since surfacing them would only trigger retry
/// storms for transitions that are idempotent anyway.
#[post("/webhook")]
async fn post_webhook(
    payload: web::Bytes,
    req: actix_web::HttpRequest,
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let signature = match req.headers().get("stripe-signature") {
        Some(signature) => signature.to_str().unwrap_or(""),
        None => return Err(AppError::BadRequest("Stripe signature missing".to_string())),
    };
    let payload = std::str::from_utf8(&payload)
        .map_err(|_| AppError::BadRequest("Webhook payload is not valid UTF-8".to_string()))?;

    let event =
        services::webhook::construct_event(payload, signature, &config.stripe_webhook_secret)?;

    let client = stripe::create_client(&config.stripe_secret_key);
    if let Err(e) = services::webhook::process_event(&pool, &client, event).await {
        log::error!("Webhook processing error: {}", e);
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "received": true })))
}
