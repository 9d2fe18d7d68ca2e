use log::info;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::common::error::{AppError, Res};

/// Seconds a playback token stays valid.
pub const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResult {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    result: Option<TokenResult>,
}

/// Thin client for the streaming provider's signed playback-token API.
pub struct StreamClient {
    client: Client,
    account_id: String,
    api_token: String,
}

impl StreamClient {
    pub fn new(account_id: String, api_token: String) -> Self {
        StreamClient {
            client: Client::new(),
            account_id,
            api_token,
        }
    }

    /// Requests a short-lived signed token for one video. `expires_at` is a
    /// Unix timestamp the provider embeds in the token.
    pub async fn issue_playback_token(&self, video_uid: &str, expires_at: i64) -> Res<String> {
        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/stream/{}/token",
            self.account_id, video_uid
        );

        info!("Requesting playback token for video {}", video_uid);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "exp": expires_at }))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Streaming provider returned {}: {}",
                status, body
            )));
        }

        let envelope = response.json::<TokenEnvelope>().await?;
        envelope
            .result
            .map(|r| r.token)
            .ok_or_else(|| AppError::Internal("Streaming provider returned no token".to_string()))
    }
}
