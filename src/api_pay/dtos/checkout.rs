use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What a checkout session pays for. Recurring types open a subscription
/// session; everything else is a one-time payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Order,
    Video,
    Program,
    ProfessorSubscription,
    EventTicket,
    PlatformSubscription,
}

impl PaymentType {
    pub fn is_recurring(&self) -> bool {
        matches!(
            self,
            PaymentType::PlatformSubscription | PaymentType::ProfessorSubscription
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Order => "order",
            PaymentType::Video => "video",
            PaymentType::Program => "program",
            PaymentType::ProfessorSubscription => "professor_subscription",
            PaymentType::EventTicket => "event_ticket",
            PaymentType::PlatformSubscription => "platform_subscription",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutItem {
    pub id: String,
    pub name: String,
    /// Unit price in the smallest currency unit (cents).
    pub price: i64,
    pub quantity: u32,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub payment_type: PaymentType,
    pub items: Vec<CheckoutItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Carried through to the provider session so the webhook can resolve
    /// the target (`target_id`, `professor_id`, ...).
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    /// Fixed provider price for recurring checkouts. Without it a monthly
    /// price is synthesized from the first item only (known limitation:
    /// multi-item recurring checkouts use `items[0]` and ignore the rest).
    pub price_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}
