//! Potato HTTP client with bearer-token authentication

use super::MessageSource;
use async_trait::async_trait;
use potato_core::{ChannelId, Error, GatewayConfig, Message, Result, SendMessageRequest};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, error, instrument};

const USER_AGENT_VALUE: &str = concat!("potato-client/", env!("CARGO_PKG_VERSION"));

/// Error body returned by the API: `{ "error": "..." }`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the Potato REST API
///
/// Holds the access token it was created with; a rotated token needs a new
/// client.
pub struct ChatClient {
    http: Client,
    config: GatewayConfig,
    access_token: String,
}

impl ChatClient {
    /// Create a new client for the configured host
    pub fn new(config: GatewayConfig, access_token: &str) -> Result<Self> {
        let http = Client::builder().user_agent(USER_AGENT_VALUE).build()?;

        Ok(Self {
            http,
            config,
            access_token: access_token.to_string(),
        })
    }

    /// Check if response indicates authentication failure
    fn check_auth_error(response: &Response) -> Option<Error> {
        match response.status().as_u16() {
            401 => Some(Error::TokenExpired),
            403 => Some(Error::AuthenticationError("Access forbidden".to_string())),
            _ => None,
        }
    }

    /// Turn a non-success response into `Error::ApiError` using the API's
    /// error body when there is one
    async fn error_for_status(response: Response) -> Result<Response> {
        if let Some(err) = Self::check_auth_error(&response) {
            return Err(err);
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = api_error_message(&body)
            .unwrap_or_else(|| format!("Request failed: {}", status));
        error!("API request failed: HTTP {} - {}", status, message);
        Err(Error::ApiError(message))
    }

    /// List the channel's recent messages, newest first
    #[instrument(skip(self))]
    pub async fn list_messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>> {
        let url = self
            .config
            .api_url(&format!("channels/{}/messages", channel_id))?;

        debug!("Fetching messages from: {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let response = Self::error_for_status(response).await?;

        let messages: Vec<Message> = response.json().await.map_err(|e| {
            error!("Failed to parse message list: {}", e);
            Error::InvalidData(e.to_string())
        })?;

        debug!("Fetched {} messages for channel {}", messages.len(), channel_id);
        Ok(messages)
    }

    /// Post a new message. The created message also arrives over the gateway
    /// as `MESSAGE_CREATE`.
    #[instrument(skip(self, content))]
    pub async fn send_message(&self, channel_id: &ChannelId, content: &str) -> Result<Message> {
        let url = self
            .config
            .api_url(&format!("channels/{}/messages", channel_id))?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&SendMessageRequest {
                content: content.to_string(),
            })
            .send()
            .await?;

        let response = Self::error_for_status(response).await?;

        let message: Message = response.json().await.map_err(|e| {
            error!("Failed to parse created message: {}", e);
            Error::InvalidData(e.to_string())
        })?;

        debug!("Message {} sent to channel {}", message.id, channel_id);
        Ok(message)
    }
}

#[async_trait]
impl MessageSource for ChatClient {
    async fn fetch_messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>> {
        self.list_messages(channel_id).await
    }
}

/// Extract the `error` field from an API error body
fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"error":"channel not found"}"#).as_deref(),
            Some("channel not found")
        );
        assert_eq!(api_error_message(r#"{"error":""}"#), None);
        assert_eq!(api_error_message("<html>bad gateway</html>"), None);
    }
}
