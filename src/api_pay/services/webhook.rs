use chrono::{DateTime, Utc};
use sqlx::PgPool;
use stripe::{
    CheckoutSessionMode, Client, Event, EventObject, EventType, Invoice, PaymentIntent,
    Subscription, SubscriptionStatus, Webhook,
};
use uuid::Uuid;

use crate::common::error::{AppError, Res};
use crate::db;
use crate::db::subscription::ProfessorSubscriptionUpdate;
use crate::db::user::PlatformSubscriptionUpdate;

/// Creates an event for the webhook based on the request payload and signature.
/// Requires a webhook secret key.
pub fn construct_event(payload: &str, signature: &str, webhook_secret: &str) -> Res<Event> {
    match Webhook::construct_event(payload, signature, webhook_secret) {
        Ok(event) => Ok(event),
        Err(e) => {
            log::error!("Error constructing webhook event: {}", e);
            Err(AppError::BadRequest(format!("Webhook Error: {}", e)))
        }
    }
}

/// Applies the state transition for one provider event. Delivery is
/// at-least-once, so every branch tolerates a replay: completed sessions are
/// matched in the pending state, purchases insert-if-absent, subscription
/// upserts overwrite with the same values.
pub async fn process_event(pool: &PgPool, client: &Client, event: Event) -> Res<()> {
    log::info!("Processing webhook event: {}", event.type_);

    match event.type_ {
        EventType::CheckoutSessionCompleted => {
            if let EventObject::CheckoutSession(session) = event.data.object {
                handle_checkout_completed(pool, client, session).await?;
            }
        }
        EventType::PaymentIntentSucceeded => {
            if let EventObject::PaymentIntent(payment_intent) = event.data.object {
                handle_payment_succeeded(pool, payment_intent).await?;
            }
        }
        EventType::PaymentIntentPaymentFailed => {
            if let EventObject::PaymentIntent(payment_intent) = event.data.object {
                handle_payment_failed(pool, payment_intent).await?;
            }
        }
        EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated => {
            if let EventObject::Subscription(subscription) = event.data.object {
                apply_subscription_change(pool, &subscription).await?;
            }
        }
        EventType::CustomerSubscriptionDeleted => {
            if let EventObject::Subscription(subscription) = event.data.object {
                handle_subscription_deleted(pool, &subscription).await?;
            }
        }
        EventType::InvoicePaymentSucceeded => {
            if let EventObject::Invoice(invoice) = event.data.object {
                log::info!("Invoice payment succeeded: {}", invoice.id);
            }
        }
        EventType::InvoicePaymentFailed => {
            if let EventObject::Invoice(invoice) = event.data.object {
                handle_invoice_failed(pool, invoice).await?;
            }
        }
        _ => {
            log::info!("Unhandled event type: {}", event.type_);
        }
    }

    Ok(())
}

/// Collapses the provider's subscription status into our two states.
pub fn active_equivalent(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Active | SubscriptionStatus::Trialing => "active",
        _ => "cancelled",
    }
}

/// The scope a subscription event applies to, read from the metadata the
/// checkout builder attached to the subscription.
#[derive(Debug, PartialEq, Eq)]
pub enum SubscriptionScope {
    Platform { user_id: Uuid },
    Professor { user_id: Uuid, professor_id: Uuid },
}

pub fn subscription_scope(metadata: &stripe::Metadata) -> Option<SubscriptionScope> {
    let user_id = metadata.get("user_id")?.parse::<Uuid>().ok()?;
    match metadata.get("payment_type").map(String::as_str) {
        Some("platform_subscription") => Some(SubscriptionScope::Platform { user_id }),
        Some("professor_subscription") => {
            let professor_id = metadata.get("professor_id")?.parse::<Uuid>().ok()?;
            Some(SubscriptionScope::Professor {
                user_id,
                professor_id,
            })
        }
        _ => None,
    }
}

fn period_end(subscription: &Subscription) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(subscription.current_period_end, 0)
}

/// Start date of the provider subscription. Stable across renewals of the
/// same subscription; a resubscription is a new subscription with a new
/// start, which restarts the withdrawal window.
fn subscription_start(subscription: &Subscription) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(subscription.start_date, 0)
}

async fn handle_checkout_completed(
    pool: &PgPool,
    client: &Client,
    session: stripe::CheckoutSession,
) -> Res<()> {
    let session_id = session.id.to_string();

    // First completion wins; a replayed event matches nothing
    let Some(row) = db::checkout::complete_session(pool, &session_id).await? else {
        log::info!("Checkout session {} already completed, skipping", session_id);
        return Ok(());
    };

    if session.mode == CheckoutSessionMode::Subscription {
        let subscription = match session.subscription {
            Some(stripe::Expandable::Object(subscription)) => *subscription,
            Some(stripe::Expandable::Id(id)) => {
                Subscription::retrieve(client, &id, &[]).await?
            }
            None => {
                log::warn!("Completed subscription session {} has no subscription", session_id);
                return Ok(());
            }
        };
        return apply_subscription_change(pool, &subscription).await;
    }

    let payment_intent_id = session
        .payment_intent
        .as_ref()
        .map(|intent| intent.id().to_string());

    match row.payment_type.as_str() {
        "order" => {
            let Some(order_id) = row.target_id.as_deref().and_then(|id| id.parse::<Uuid>().ok())
            else {
                log::warn!("Order session {} has no usable target_id", session_id);
                return Ok(());
            };
            settle_order(pool, order_id, &session_id).await?;
            db::payment::insert_payment(
                pool,
                Some(row.user_id),
                payment_intent_id.as_deref(),
                Some(&session_id),
                Some(order_id),
                row.amount,
                &row.currency,
                "order",
            )
            .await?;
        }
        item_type @ ("video" | "program") => {
            let Some(target_id) = row.target_id.as_deref().and_then(|id| id.parse::<Uuid>().ok())
            else {
                log::warn!("Purchase session {} has no usable target_id", session_id);
                return Ok(());
            };
            let created = db::purchase::insert_purchase_if_absent(
                pool,
                row.user_id,
                item_type,
                target_id,
                row.amount,
            )
            .await?;
            if !created {
                log::info!(
                    "Purchase of {} {} by {} already recorded",
                    item_type,
                    target_id,
                    row.user_id
                );
            }
            db::payment::insert_payment(
                pool,
                Some(row.user_id),
                payment_intent_id.as_deref(),
                Some(&session_id),
                None,
                row.amount,
                &row.currency,
                item_type,
            )
            .await?;
        }
        "event_ticket" => {
            let confirmed = db::order::confirm_ticket_holds(pool, &session_id).await?;
            log::info!("Confirmed {} ticket holds for session {}", confirmed, session_id);
            db::payment::insert_payment(
                pool,
                Some(row.user_id),
                payment_intent_id.as_deref(),
                Some(&session_id),
                None,
                row.amount,
                &row.currency,
                "event_ticket",
            )
            .await?;
        }
        other => {
            log::warn!("Completed session {} with unknown payment_type {}", session_id, other);
        }
    }

    Ok(())
}

/// Paid order: decrement stock per item, drop the reservation, confirm any
/// ticket holds riding on the order. Guarded by the pending→paid transition.
async fn settle_order(pool: &PgPool, order_id: Uuid, session_id: &str) -> Res<()> {
    let Some(order) = db::order::mark_paid(pool, order_id).await? else {
        log::info!("Order {} not pending (session {}), skipping", order_id, session_id);
        return Ok(());
    };

    for item in db::order::get_items(pool, order.id).await? {
        db::order::commit_stock(pool, item.product_id, item.quantity).await?;
    }
    db::order::confirm_ticket_holds_for_order(pool, order.id).await?;
    Ok(())
}

async fn handle_payment_succeeded(pool: &PgPool, payment_intent: PaymentIntent) -> Res<()> {
    let intent_id = payment_intent.id.to_string();
    if db::payment::set_status_by_intent(pool, &intent_id, "succeeded")
        .await?
        .is_none()
    {
        log::warn!("No payment entry for intent {}", intent_id);
    }
    Ok(())
}

async fn handle_payment_failed(pool: &PgPool, payment_intent: PaymentIntent) -> Res<()> {
    let intent_id = payment_intent.id.to_string();
    let Some(payment) = db::payment::set_status_by_intent(pool, &intent_id, "failed").await? else {
        log::warn!("No payment entry for failed intent {}", intent_id);
        return Ok(());
    };

    // A failed order payment cancels the order and frees its reservation
    if let Some(order_id) = payment.order_id {
        if db::order::mark_cancelled(pool, order_id).await?.is_some() {
            for item in db::order::get_items(pool, order_id).await? {
                db::order::release_reservation(pool, item.product_id, item.quantity).await?;
            }
        }
    }
    Ok(())
}

async fn apply_subscription_change(pool: &PgPool, subscription: &Subscription) -> Res<()> {
    let Some(scope) = subscription_scope(&subscription.metadata) else {
        log::warn!(
            "Subscription {} carries no scope metadata, skipping",
            subscription.id
        );
        return Ok(());
    };

    let status = active_equivalent(subscription.status).to_string();
    let started_at = subscription_start(subscription);
    let expires_at = period_end(subscription);
    let (price_id, price_paid) = subscription
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .map(|price| (Some(price.id.to_string()), price.unit_amount))
        .unwrap_or((None, None));

    match scope {
        SubscriptionScope::Platform { user_id } => {
            db::user::update_platform_subscription(
                pool,
                user_id,
                &PlatformSubscriptionUpdate {
                    status,
                    subscription_id: subscription.id.to_string(),
                    price_id,
                    price_paid,
                    started_at,
                    expires_at,
                    cancel_at_period_end: subscription.cancel_at_period_end,
                },
            )
            .await
        }
        SubscriptionScope::Professor {
            user_id,
            professor_id,
        } => {
            db::subscription::upsert_professor_subscription(
                pool,
                &ProfessorSubscriptionUpdate {
                    user_id,
                    professor_id,
                    status,
                    subscription_id: subscription.id.to_string(),
                    price_id,
                    price_paid,
                    started_at,
                    expires_at,
                    cancel_at_period_end: subscription.cancel_at_period_end,
                },
            )
            .await
        }
    }
}

async fn handle_subscription_deleted(pool: &PgPool, subscription: &Subscription) -> Res<()> {
    let provider_id = subscription.id.to_string();
    match subscription_scope(&subscription.metadata) {
        Some(SubscriptionScope::Platform { .. }) => {
            db::user::clear_platform_subscription(pool, &provider_id).await
        }
        Some(SubscriptionScope::Professor { .. }) => {
            db::subscription::clear_professor_subscription(pool, &provider_id).await
        }
        None => {
            log::warn!(
                "Deleted subscription {} carries no scope metadata, skipping",
                provider_id
            );
            Ok(())
        }
    }
}

async fn handle_invoice_failed(pool: &PgPool, invoice: Invoice) -> Res<()> {
    let Some(customer_id) = invoice.customer.as_ref().map(|c| c.id().to_string()) else {
        log::warn!("Failed invoice {} has no customer", invoice.id);
        return Ok(());
    };

    let Some(user) = db::user::get_user_by_customer_id(pool, &customer_id).await? else {
        log::warn!("No user mapped to customer {} for failed invoice", customer_id);
        return Ok(());
    };

    db::notification::insert_notification(
        pool,
        user.id,
        "Payment failed",
        "A subscription payment could not be processed. Please update your payment method.",
        "high",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const WEBHOOK_SECRET: &str = "whsec_test123secret456";

    fn signature_header(payload: &str, secret: &str, timestamp: i64) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(signed_payload.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn event_payload() -> String {
        serde_json::json!({
            "id": "evt_test_1",
            "object": "event",
            "api_version": "2020-08-27",
            "created": 1_700_000_000,
            "data": {
                "object": {
                    "id": "pi_test_1",
                    "object": "payment_intent",
                    "amount": 4200,
                    "amount_capturable": 0,
                    "amount_received": 4200,
                    "capture_method": "automatic",
                    "confirmation_method": "automatic",
                    "created": 1_700_000_000,
                    "currency": "eur",
                    "livemode": false,
                    "metadata": {},
                    "payment_method_types": ["card"],
                    "status": "succeeded"
                }
            },
            "livemode": false,
            "pending_webhooks": 1,
            "request": { "id": null, "idempotency_key": null },
            "type": "payment_intent.succeeded"
        })
        .to_string()
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = event_payload();
        let header = signature_header(&payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp());

        let event = construct_event(&payload, &header, WEBHOOK_SECRET)
            .expect("valid signature should verify");
        assert_eq!(event.type_, EventType::PaymentIntentSucceeded);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = event_payload();
        let header = signature_header(&payload, "whsec_other", chrono::Utc::now().timestamp());

        assert!(construct_event(&payload, &header, WEBHOOK_SECRET).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = event_payload();
        // 10 minutes old, beyond the default 5-minute tolerance
        let stale = chrono::Utc::now().timestamp() - 600;
        let header = signature_header(&payload, WEBHOOK_SECRET, stale);

        assert!(construct_event(&payload, &header, WEBHOOK_SECRET).is_err());
    }

    #[test]
    fn provider_status_maps_to_two_states() {
        assert_eq!(active_equivalent(SubscriptionStatus::Active), "active");
        assert_eq!(active_equivalent(SubscriptionStatus::Trialing), "active");
        assert_eq!(active_equivalent(SubscriptionStatus::PastDue), "cancelled");
        assert_eq!(active_equivalent(SubscriptionStatus::Canceled), "cancelled");
        assert_eq!(active_equivalent(SubscriptionStatus::Unpaid), "cancelled");
    }

    #[test]
    fn scope_requires_user_metadata() {
        let mut metadata = stripe::Metadata::new();
        metadata.insert("payment_type".to_string(), "platform_subscription".to_string());
        assert_eq!(subscription_scope(&metadata), None);

        let user_id = Uuid::new_v4();
        metadata.insert("user_id".to_string(), user_id.to_string());
        assert_eq!(
            subscription_scope(&metadata),
            Some(SubscriptionScope::Platform { user_id })
        );
    }

    #[test]
    fn professor_scope_requires_professor_id() {
        let user_id = Uuid::new_v4();
        let professor_id = Uuid::new_v4();

        let mut metadata = stripe::Metadata::new();
        metadata.insert("payment_type".to_string(), "professor_subscription".to_string());
        metadata.insert("user_id".to_string(), user_id.to_string());
        assert_eq!(subscription_scope(&metadata), None);

        metadata.insert("professor_id".to_string(), professor_id.to_string());
        assert_eq!(
            subscription_scope(&metadata),
            Some(SubscriptionScope::Professor {
                user_id,
                professor_id
            })
        );
    }
}
