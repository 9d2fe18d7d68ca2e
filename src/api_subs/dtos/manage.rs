use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManageAction {
    Cancel,
    Reactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Platform,
    Professor,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Platform => "platform",
            SubscriptionType::Professor => "professor",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ManageRequest {
    pub action: ManageAction,
    pub subscription_type: SubscriptionType,
    pub professor_id: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub cancellation_feedback: Option<String>,
    #[serde(default)]
    pub request_refund: bool,
}

#[derive(Debug, Serialize)]
pub struct ManageResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_processed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlatformSubscriptionView {
    pub status: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Serialize)]
pub struct CurrentSubscriptionsResponse {
    pub platform: PlatformSubscriptionView,
    pub professors: Vec<crate::db::models::ProfessorSubscription>,
}
