//! Message API operations with validation

use crate::ChatClient;
use potato_core::{ChannelId, Error, Message, Result};
use tracing::info;

/// Post a message typed by the user.
///
/// Surrounding whitespace is trimmed; blank input is rejected before any
/// request is made.
pub async fn post_message(
    client: &ChatClient,
    channel_id: &ChannelId,
    input: &str,
) -> Result<Message> {
    let content = normalize_content(input)?;
    info!("Posting message to channel {}", channel_id);
    client.send_message(channel_id, content).await
}

fn normalize_content(input: &str) -> Result<&str> {
    let content = input.trim();
    if content.is_empty() {
        return Err(Error::InvalidData("Message content is empty".to_string()));
    }
    Ok(content)
}
