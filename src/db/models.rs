use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A platform account. The platform-subscription fields live directly on the
/// user row; per-professor subscriptions have their own table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub stripe_customer_id: Option<String>,
    pub platform_subscription_status: Option<String>,
    pub platform_subscription_id: Option<String>,
    pub platform_price_id: Option<String>,
    pub platform_price_paid: Option<i64>,
    pub platform_subscription_started_at: Option<DateTime<Utc>>,
    pub platform_subscription_expires_at: Option<DateTime<Utc>>,
    pub platform_cancel_at_period_end: bool,
    pub platform_withdrawal_right_waived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProfessorSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub professor_id: Uuid,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub price_paid: Option<i64>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub withdrawal_right_waived: bool,
}

/// Pending/completed link between a Stripe checkout session and what it pays
/// for. Keyed by the provider session id so replayed webhooks hit the same row.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub user_id: Uuid,
    pub payment_type: String,
    pub target_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_type: String,
    pub target_id: Uuid,
    pub amount_paid: i64,
    pub status: String,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub order_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub payment_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

/// One counting window for `actor:scope`. A fresh window replaces an expired
/// one in place; the row is denied once `count` reaches the configured limit.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub key: String,
    pub count: i32,
    pub window_start: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub professor_id: Uuid,
    pub program_id: Option<Uuid>,
    pub title: String,
    pub visibility: String,
    pub price: Option<i64>,
    pub stream_uid: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One persisted request log entry (written by the logger middleware).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status_code: i32,
    pub user_id: Option<Uuid>,
    pub params: Option<serde_json::Value>,
    pub request_body: Option<serde_json::Value>,
    pub response_body: Option<serde_json::Value>,
    pub ip_address: String,
    pub user_agent: String,
}
