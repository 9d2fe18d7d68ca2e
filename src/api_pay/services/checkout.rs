use chrono::{Duration, Utc};
use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionLineItemsPriceDataRecurring,
    CreateCheckoutSessionLineItemsPriceDataRecurringInterval,
    CreateCheckoutSessionSubscriptionData, Currency, CustomerId,
};
use uuid::Uuid;

use crate::api_pay::dtos::checkout::{CheckoutRequest, CheckoutResponse};
use crate::common::error::{AppError, Res};
use crate::common::jwt::Claims;
use crate::common::stripe as stripe_common;
use crate::db;

pub const MAX_ITEMS: usize = 100;
pub const MAX_QUANTITY: u32 = 1000;
const SESSION_TTL_HOURS: i64 = 24;
const CURRENCY: Currency = Currency::EUR;

/// Structural validation of a checkout request. Every violation is collected
/// so the caller gets the full list in one round trip.
pub fn validate_request(req: &CheckoutRequest) -> Vec<String> {
    let mut violations = Vec::new();

    if req.items.is_empty() {
        violations.push("items array cannot be empty".to_string());
    }
    if req.items.len() > MAX_ITEMS {
        violations.push(format!(
            "items array cannot contain more than {} entries",
            MAX_ITEMS
        ));
    }

    for (index, item) in req.items.iter().enumerate() {
        if item.price < 0 {
            violations.push(format!("items[{}]: price cannot be negative", index));
        }
        if item.quantity < 1 || item.quantity > MAX_QUANTITY {
            violations.push(format!(
                "items[{}]: quantity must be between 1 and {}",
                index, MAX_QUANTITY
            ));
        }
    }

    if url::Url::parse(&req.success_url).is_err() {
        violations.push("success_url is not a valid URL".to_string());
    }
    if url::Url::parse(&req.cancel_url).is_err() {
        violations.push("cancel_url is not a valid URL".to_string());
    }

    if total_amount(req).is_none() {
        violations.push("total amount exceeds the supported range".to_string());
    }

    violations
}

/// Total the session settles, in cents. `None` when the sum does not fit in
/// the amount column.
pub fn total_amount(req: &CheckoutRequest) -> Option<i64> {
    req.items.iter().try_fold(0i64, |sum, item| {
        item.price
            .checked_mul(i64::from(item.quantity))
            .and_then(|line_total| sum.checked_add(line_total))
    })
}

/// Returns the actor's provider customer id, creating the upstream customer
/// and persisting the mapping on first use. The stored mapping makes this
/// idempotent per actor: a second call never creates a duplicate customer.
pub async fn resolve_customer(pool: &PgPool, client: &Client, claims: &Claims) -> Res<CustomerId> {
    let user = db::user::get_user_by_id(pool, claims.user_id).await?;

    if let Some(customer_id) = user.stripe_customer_id {
        return customer_id.parse::<CustomerId>().map_err(|e| {
            AppError::Internal(format!(
                "Failed to parse stored customer id: {}. {}",
                customer_id, e
            ))
        });
    }

    let customer = stripe_common::create_customer(client, &user.email, &user.display_name).await?;
    db::user::set_stripe_customer_id(pool, user.id, customer.id.as_str()).await?;
    Ok(customer.id)
}

fn session_metadata(user_id: Uuid, req: &CheckoutRequest) -> stripe::Metadata {
    let mut metadata = req.metadata.clone().unwrap_or_default();
    metadata.insert("payment_type".to_string(), req.payment_type.as_str().to_string());
    metadata.insert("user_id".to_string(), user_id.to_string());
    metadata
}

/// Opens a subscription session: either against a fixed provider price, or
/// with a monthly price synthesized from the first item.
async fn create_recurring_session(
    client: &Client,
    customer_id: CustomerId,
    req: &CheckoutRequest,
    metadata: stripe::Metadata,
) -> Res<CheckoutSession> {
    let line_item = match &req.price_id {
        Some(price_id) => CreateCheckoutSessionLineItems {
            price: Some(price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        },
        None => {
            // Only items[0] feeds the synthesized price
            let item = req
                .items
                .first()
                .ok_or_else(|| AppError::BadRequest("items array cannot be empty".to_string()))?;
            CreateCheckoutSessionLineItems {
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: CURRENCY,
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: item.name.clone(),
                        ..Default::default()
                    }),
                    recurring: Some(CreateCheckoutSessionLineItemsPriceDataRecurring {
                        interval: CreateCheckoutSessionLineItemsPriceDataRecurringInterval::Month,
                        interval_count: Some(1),
                    }),
                    unit_amount: Some(item.price),
                    ..Default::default()
                }),
                quantity: Some(1),
                ..Default::default()
            }
        }
    };

    let params = CreateCheckoutSession {
        payment_method_types: Some(vec![stripe::CreateCheckoutSessionPaymentMethodTypes::Card]),
        line_items: Some(vec![line_item]),
        mode: Some(CheckoutSessionMode::Subscription),
        success_url: Some(req.success_url.as_str()),
        cancel_url: Some(req.cancel_url.as_str()),
        customer: Some(customer_id),
        metadata: Some(metadata.clone()),
        // Subscription events carry their own metadata, so the reconciler
        // can scope them without the originating session
        subscription_data: Some(CreateCheckoutSessionSubscriptionData {
            metadata: Some(metadata),
            ..Default::default()
        }),
        ..Default::default()
    };
    CheckoutSession::create(client, params)
        .await
        .map_err(AppError::from)
}

/// Opens a one-time payment session over all line items.
async fn create_payment_session(
    client: &Client,
    customer_id: CustomerId,
    req: &CheckoutRequest,
    metadata: stripe::Metadata,
) -> Res<CheckoutSession> {
    let line_items = req
        .items
        .iter()
        .map(|item| CreateCheckoutSessionLineItems {
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: CURRENCY,
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: item.name.clone(),
                    ..Default::default()
                }),
                unit_amount: Some(item.price),
                ..Default::default()
            }),
            quantity: Some(item.quantity as u64),
            ..Default::default()
        })
        .collect();

    let params = CreateCheckoutSession {
        payment_method_types: Some(vec![stripe::CreateCheckoutSessionPaymentMethodTypes::Card]),
        line_items: Some(line_items),
        mode: Some(CheckoutSessionMode::Payment),
        success_url: Some(req.success_url.as_str()),
        cancel_url: Some(req.cancel_url.as_str()),
        customer: Some(customer_id),
        metadata: Some(metadata),
        ..Default::default()
    };
    CheckoutSession::create(client, params)
        .await
        .map_err(AppError::from)
}

/// Full checkout flow: rate limit, validation, customer resolution, provider
/// session, pending record-store row.
pub async fn create_checkout(
    pool: &PgPool,
    client: &Client,
    claims: &Claims,
    req: CheckoutRequest,
) -> Res<CheckoutResponse> {
    if !crate::limiter::allow(pool, claims.user_id, "checkout").await? {
        return Err(AppError::TooManyRequests(
            "Too many checkout attempts, retry in a minute".to_string(),
        ));
    }

    let violations = validate_request(&req);
    if !violations.is_empty() {
        return Err(AppError::Validation(violations));
    }

    let amount = total_amount(&req)
        .ok_or_else(|| AppError::BadRequest("total amount exceeds the supported range".to_string()))?;

    let customer_id = resolve_customer(pool, client, claims).await?;
    let metadata = session_metadata(claims.user_id, &req);

    let session = if req.payment_type.is_recurring() {
        create_recurring_session(client, customer_id, &req, metadata).await?
    } else {
        create_payment_session(client, customer_id, &req, metadata).await?
    };

    let target_id = req
        .metadata
        .as_ref()
        .and_then(|m| m.get("target_id").cloned())
        .or_else(|| req.items.first().map(|item| item.id.clone()));

    db::checkout::insert_pending_session(
        pool,
        session.id.as_str(),
        claims.user_id,
        req.payment_type.as_str(),
        target_id.as_deref(),
        amount,
        &CURRENCY.to_string(),
        Utc::now() + Duration::hours(SESSION_TTL_HOURS),
    )
    .await?;

    Ok(CheckoutResponse {
        session_id: session.id.to_string(),
        url: session.url.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_pay::dtos::checkout::{CheckoutItem, PaymentType};

    fn item(price: i64, quantity: u32) -> CheckoutItem {
        CheckoutItem {
            id: "vid_1".to_string(),
            name: "Intro lecture".to_string(),
            price,
            quantity,
            metadata: None,
        }
    }

    fn request(items: Vec<CheckoutItem>) -> CheckoutRequest {
        CheckoutRequest {
            payment_type: PaymentType::Video,
            items,
            success_url: "https://academy.example/success".to_string(),
            cancel_url: "https://academy.example/cancel".to_string(),
            metadata: None,
            price_id: None,
        }
    }

    #[test]
    fn empty_items_is_reported() {
        let violations = validate_request(&request(vec![]));
        assert!(violations.contains(&"items array cannot be empty".to_string()));
    }

    #[test]
    fn all_violations_are_collected_together() {
        let mut req = request(vec![item(-100, 0)]);
        req.success_url = "not a url".to_string();

        let violations = validate_request(&req);
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.contains("price")));
        assert!(violations.iter().any(|v| v.contains("quantity")));
        assert!(violations.iter().any(|v| v.contains("success_url")));
    }

    #[test]
    fn quantity_bounds_are_inclusive() {
        assert!(validate_request(&request(vec![item(500, 1)])).is_empty());
        assert!(validate_request(&request(vec![item(500, 1000)])).is_empty());
        assert!(!validate_request(&request(vec![item(500, 1001)])).is_empty());
    }

    #[test]
    fn too_many_items_is_rejected() {
        let items = (0..101).map(|_| item(500, 1)).collect();
        let violations = validate_request(&request(items));
        assert!(violations.iter().any(|v| v.contains("more than 100")));
    }

    #[test]
    fn amount_is_sum_of_price_times_quantity() {
        let req = request(vec![item(500, 3), item(250, 2)]);
        assert_eq!(total_amount(&req), Some(500 * 3 + 250 * 2));
    }

    #[test]
    fn overflowing_amount_is_rejected_not_wrapped() {
        let req = request(vec![item(i64::MAX, 1000)]);
        assert_eq!(total_amount(&req), None);

        let violations = validate_request(&req);
        assert!(violations.iter().any(|v| v.contains("total amount")));
    }

    #[test]
    fn overflowing_sum_across_items_is_rejected() {
        let req = request(vec![item(i64::MAX, 1), item(1, 1)]);
        assert_eq!(total_amount(&req), None);
        assert!(!validate_request(&req).is_empty());
    }

    #[test]
    fn session_metadata_carries_payment_type_and_user() {
        let req = request(vec![item(500, 1)]);
        let user_id = Uuid::new_v4();
        let metadata = session_metadata(user_id, &req);
        assert_eq!(metadata.get("payment_type").map(String::as_str), Some("video"));
        assert_eq!(metadata.get("user_id"), Some(&user_id.to_string()));
    }
}
