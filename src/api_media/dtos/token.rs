use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTokenRequest {
    pub video_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTokenResponse {
    pub token: String,
    pub video_id: Uuid,
    /// Unix timestamp the token stops working at.
    pub expires_at: i64,
    pub expires_in: i64,
}
