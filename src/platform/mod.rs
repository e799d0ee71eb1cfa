pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// A message received from the chat platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Sender's user ID; `None` for channel posts and other anonymous updates
    pub sender_id: Option<u64>,
    /// Display name of the sender, used for logging only
    pub sender_name: String,
    /// Chat the message arrived in and any reply goes to
    pub chat_id: i64,
    /// The message text (empty for non-text messages)
    pub text: String,
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}
