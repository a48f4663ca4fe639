//! Administrator commands and the persisted per-admin forwarding mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::UserId;

/// What the admin's non-command messages are currently used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "target", rename_all = "snake_case")]
pub enum AdminMode {
    /// Messages are not forwarded
    #[default]
    Idle,
    /// Every message goes to every stored user
    Broadcast,
    /// Every message goes to one user
    SendTo(UserId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSession {
    pub admin_id: UserId,
    pub mode: AdminMode,
    pub updated_at: DateTime<Utc>,
}

impl AdminSession {
    pub fn new(admin_id: UserId, mode: AdminMode) -> Self {
        Self {
            admin_id,
            mode,
            updated_at: Utc::now(),
        }
    }
}

/// Slash commands understood by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    AddVip(UserId),
    Broadcast,
    CancelBroadcast,
    Send(UserId),
    CancelSend,
    /// Starts with `/` but is not one of ours, or has a bad argument
    Unknown(String),
}

impl Command {
    /// Commands only the administrator may run
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::AddVip(_)
                | Command::Broadcast
                | Command::CancelBroadcast
                | Command::Send(_)
                | Command::CancelSend
        )
    }
}

/// Parse a slash command. Returns `None` for text that is not a command.
///
/// A `@botname` suffix on the command word is accepted, as Telegram adds it
/// in group chats.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.split_whitespace();
    let word = parts.next()?;
    let name = word.split('@').next().unwrap_or(word);
    let arg = parts.next();

    let target = |arg: Option<&str>| arg.and_then(|a| a.parse::<UserId>().ok());

    let cmd = match name {
        "/start" => Command::Start,
        "/addvip" => match target(arg) {
            Some(id) => Command::AddVip(id),
            None => Command::Unknown(text.to_string()),
        },
        "/broadcast" => Command::Broadcast,
        "/cancelbroadcast" => Command::CancelBroadcast,
        "/send" => match target(arg) {
            Some(id) => Command::Send(id),
            None => Command::Unknown(text.to_string()),
        },
        "/cancelsend" => Command::CancelSend,
        _ => Command::Unknown(text.to_string()),
    };
    Some(cmd)
}
