use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use teloxide::utils::command::BotCommands;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::net::AddressResolver;
use crate::platform::{IncomingMessage, ReplySink};

#[derive(BotCommands, Clone, Copy, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "Get Local IP")]
    Ip,
    #[command(description = "Get Public IP")]
    Remote,
}

/// What happened to a single inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Unauthorized,
    Replied,
    ReplyFailed,
}

/// Parse the leading `/command[@bot]` token. Arguments after it are ignored.
fn parse_command(text: &str, bot_username: &str) -> Option<Command> {
    let head = text.split_whitespace().next()?;
    if !head.starts_with('/') {
        return None;
    }
    Command::parse(head, bot_username).ok()
}

fn format_reply(command: Command, address: &Result<IpAddr>) -> String {
    let scope = match command {
        Command::Ip => "local",
        Command::Remote => "remote",
    };
    match address {
        Ok(ip) => format!("Your {} IP is {}", scope, ip),
        Err(e) => format!("Could not determine your {} IP: {:#}", scope, e),
    }
}

/// Answers the owner's commands, one message at a time.
pub struct CommandDispatcher {
    owner_id: u64,
    bot_username: String,
    resolver: Arc<dyn AddressResolver>,
    replies: Arc<dyn ReplySink>,
}

impl CommandDispatcher {
    pub fn new(
        owner_id: u64,
        bot_username: impl Into<String>,
        resolver: Arc<dyn AddressResolver>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            owner_id,
            bot_username: bot_username.into(),
            resolver,
            replies,
        }
    }

    /// Drain `queue` until it closes or `stop` is cancelled.
    pub async fn run(&self, mut queue: mpsc::Receiver<IncomingMessage>, stop: CancellationToken) {
        info!("Dispatcher is waiting for commands");
        loop {
            let msg = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!("Stop requested, dispatcher exiting");
                    break;
                }
                next = queue.recv() => match next {
                    Some(msg) => msg,
                    None => {
                        info!("Message stream closed, dispatcher exiting");
                        break;
                    }
                },
            };

            let outcome = self.handle(&msg).await;
            debug!("Message in chat {} -> {:?}", msg.chat_id, outcome);
        }
    }

    pub async fn handle(&self, msg: &IncomingMessage) -> Outcome {
        let Some(sender_id) = msg.sender_id else {
            return Outcome::Ignored;
        };

        if sender_id != self.owner_id {
            warn!("[Unauthorized] [{}] {}", msg.sender_name, msg.text);
            return Outcome::Unauthorized;
        }

        let Some(command) = parse_command(&msg.text, &self.bot_username) else {
            return Outcome::Ignored;
        };

        info!("[{}] {}", msg.sender_name, msg.text);

        let address = match command {
            Command::Ip => self.resolver.local_ip().await,
            Command::Remote => self.resolver.public_ip().await,
        };
        if let Err(e) = &address {
            warn!("{:?} lookup failed: {:#}", command, e);
        }

        let text = format_reply(command, &address);
        match self.replies.send_text(msg.chat_id, &text).await {
            Ok(()) => Outcome::Replied,
            Err(e) => {
                error!("Failed to send reply to chat {}: {:#}", msg.chat_id, e);
                Outcome::ReplyFailed
            }
        }
    }
}
