//! Pre-flight check of the Anthropic API key with a one-token request.

use serde_json::json;

use crate::error::ApiKeyError;

pub const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const CHECK_MODEL: &str = "claude-3-haiku-20240307";

pub async fn validate_api_key(client: &reqwest::Client, api_key: &str) -> Result<(), ApiKeyError> {
    validate_api_key_at(client, MESSAGES_URL, api_key).await
}

pub async fn validate_api_key_at(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
) -> Result<(), ApiKeyError> {
    if api_key.trim().is_empty() {
        return Err(ApiKeyError::Empty);
    }

    let resp = client
        .post(url)
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&json!({
            "model": CHECK_MODEL,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "test"}],
        }))
        .send()
        .await?;

    match resp.status() {
        s if s.is_success() => Ok(()),
        reqwest::StatusCode::UNAUTHORIZED => Err(ApiKeyError::Invalid),
        reqwest::StatusCode::SERVICE_UNAVAILABLE => Err(ApiKeyError::Unavailable),
        status => Err(ApiKeyError::Status {
            status,
            body: resp.text().await.unwrap_or_default(),
        }),
    }
}
