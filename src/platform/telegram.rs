use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bot::Command;
use crate::platform::{IncomingMessage, ReplySink};

/// An authenticated Telegram bot.
pub struct TelegramPlatform {
    bot: Bot,
    username: String,
}

impl TelegramPlatform {
    fn new(bot: Bot, username: String) -> Self {
        Self { bot, username }
    }

    /// Authenticate against the Bot API. Failing here is fatal for the process.
    pub async fn connect(token: &str) -> Result<Self> {
        let bot = Bot::new(token);
        let me = bot
            .get_me()
            .await
            .context("Telegram bot authentication failed")?;
        let username = me.username().to_string();

        info!("Authorized on account {}", username);
        Ok(Self::new(bot, username))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Publish the command list shown in Telegram's command menu.
    pub async fn register_commands(&self) {
        match self.bot.set_my_commands(Command::bot_commands()).await {
            Ok(_) => info!("Registered bot commands"),
            Err(e) => warn!("Failed to register bot commands: {}", e),
        }
    }

    pub fn replies(&self) -> TelegramReplies {
        TelegramReplies {
            bot: self.bot.clone(),
        }
    }

    /// Long-poll for updates and push every message onto `queue` until `stop` fires.
    pub async fn run_polling(&self, queue: mpsc::Sender<IncomingMessage>, stop: CancellationToken) {
        info!("Starting Telegram long polling...");

        let handler = Update::filter_message().endpoint(forward_message);

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![queue])
            .default_handler(|upd| async move {
                warn!("Unhandled update: {:?}", upd.id);
            })
            .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
            .build();

        let shutdown = dispatcher.shutdown_token();
        let polling = dispatcher.dispatch();
        tokio::pin!(polling);

        // The stop branch goes first so an already-cancelled token never starts polling.
        tokio::select! {
            biased;
            _ = stop.cancelled() => {}
            _ = &mut polling => {
                info!("Telegram long polling stopped");
                return;
            }
        }

        match shutdown.shutdown() {
            Ok(done) => {
                tokio::join!(done, polling);
            }
            // Never got past idle, so dropping the future is all there is to do.
            Err(_) => debug!("Polling had not started, nothing to shut down"),
        }
        info!("Telegram long polling stopped");
    }
}

fn incoming_from(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        sender_id: msg.from.as_ref().map(|user| user.id.0),
        sender_name: msg
            .from
            .as_ref()
            .map(|user| {
                user.username
                    .clone()
                    .unwrap_or_else(|| user.first_name.clone())
            })
            .unwrap_or_default(),
        chat_id: msg.chat.id.0,
        text: msg.text().unwrap_or_default().to_string(),
    }
}

async fn forward_message(msg: Message, queue: mpsc::Sender<IncomingMessage>) -> ResponseResult<()> {
    if queue.send(incoming_from(&msg)).await.is_err() {
        warn!("Dispatcher is gone, dropping message {}", msg.id.0);
    }
    Ok(())
}

/// Sends replies through the Bot API.
#[derive(Clone)]
pub struct TelegramReplies {
    bot: Bot,
}

#[async_trait]
impl ReplySink for TelegramReplies {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match self.bot.send_message(ChatId(chat_id), text).await {
                Ok(_) => return Ok(()),
                Err(teloxide::RequestError::RetryAfter(wait)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    warn!("Rate limited, retrying in {:?}", wait.duration());
                    tokio::time::sleep(wait.duration()).await;
                }
                Err(e) => return Err(anyhow::anyhow!("telegram error: {}", e)),
            }
        }
    }
}
