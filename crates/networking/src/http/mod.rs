//! REST client and the bulk-fetch seam used to seed the message view

mod client;

pub use client::ChatClient;

use async_trait::async_trait;
use potato_core::{ChannelId, Message, Result};

/// Source of a channel's existing messages, newest first
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>>;
}
