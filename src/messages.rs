//! Texts and keyboards shown to users and to the admin.

use crate::admin::AdminMode;
use crate::config::Config;
use crate::ladder::LadderOutcome;
use crate::record::{Mode, Trend, UserId};
use crate::telegram::{Button, OutboundMessage};

pub const CB_START_FREE: &str = "start_free";
pub const CB_START_VIP: &str = "start_vip";
pub const CB_BUY_VIP: &str = "buy_vip";
pub const CB_RESULT_WIN: &str = "result_win";
pub const CB_RESULT_LOSS: &str = "result_loss";

pub fn welcome(config: &Config) -> OutboundMessage {
    OutboundMessage::markdown("🎯 *Welcome to Color Trading Bot*\n\nChoose Mode:").with_keyboard(
        vec![
            vec![Button::callback("🆓 Start Free", CB_START_FREE)],
            vec![Button::callback("💎 Start VIP", CB_START_VIP)],
            vec![Button::callback("💳 Buy VIP", CB_BUY_VIP)],
            vec![Button::url(
                "🧑‍💻 Admin Support",
                format!("https://t.me/{}", config.admin.username),
            )],
        ],
    )
}

/// Escape the legacy Markdown entity characters in free text
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn buy_vip(config: &Config) -> OutboundMessage {
    OutboundMessage::markdown(format!(
        "💎 *Buy VIP*\n\nPrice: {}\nUPI: `{}`\n\nAfter payment, contact admin:\n@{}",
        escape_markdown(&config.vip.price),
        config.vip.upi,
        escape_markdown(&config.admin.username)
    ))
}

pub fn vip_required(config: &Config) -> OutboundMessage {
    let mut msg = buy_vip(config);
    msg.text = format!("🔒 *VIP mode is locked.*\n\n{}", msg.text);
    msg
}

pub fn mode_started(mode: Mode) -> OutboundMessage {
    let title = match mode {
        Mode::Free => "🆓 *Free Mode Started!*",
        Mode::Vip => "💎 *VIP Mode Started!*",
    };
    OutboundMessage::markdown(format!(
        "{title}\nSend last 3 digit period number (e.g. 555)"
    ))
}

pub fn prediction(next_period: u64, prediction: Trend, level: u32, bet: u64) -> OutboundMessage {
    OutboundMessage::markdown(format!(
        "📊 *Prediction*\n\nNext Period: {next_period}\nPrediction: *{prediction}*\nLevel: {level}\nBet: ₹{bet}\n\nSelect the result 👇"
    ))
    .with_keyboard(vec![
        vec![Button::callback("✅ WIN", CB_RESULT_WIN)],
        vec![Button::callback("❌ LOSS", CB_RESULT_LOSS)],
    ])
}

pub fn ladder(outcome: LadderOutcome) -> OutboundMessage {
    match outcome {
        LadderOutcome::Won => OutboundMessage::markdown(
            "✅ *WIN!*\nReset to Level 1\n\nSend next period number 👇",
        ),
        LadderOutcome::Advanced { level, bet } => OutboundMessage::markdown(format!(
            "❌ *LOSS*\nNext Level: {level}\nNext Bet: ₹{bet}\n\nSend next period number 👇"
        )),
        LadderOutcome::Exhausted { max_level } => OutboundMessage::markdown(format!(
            "❌ *Max {max_level} Levels Reached.* Session Ended.\nType /start to begin again."
        )),
    }
}

pub fn start_first() -> OutboundMessage {
    OutboundMessage::plain("Please type /start first")
}

pub fn choose_mode_first() -> OutboundMessage {
    OutboundMessage::plain("Choose a mode first. Type /start to see the menu.")
}

pub fn not_admin() -> OutboundMessage {
    OutboundMessage::plain("❌ You are not admin")
}

pub fn vip_granted(id: UserId) -> OutboundMessage {
    OutboundMessage::plain(format!("✅ User {id} is now VIP"))
}

pub fn vip_unknown_user(id: UserId) -> OutboundMessage {
    OutboundMessage::plain(format!("⚠️ User {id} has not started the bot yet"))
}

pub fn admin_mode(mode: AdminMode) -> OutboundMessage {
    let text = match mode {
        AdminMode::Broadcast => "📣 Broadcast mode ON.\nEverything you send now (text/photo/video/voice/link/file) goes to all users.\nCancel: /cancelbroadcast".to_string(),
        AdminMode::SendTo(id) => format!(
            "🎯 Send mode ON for user {id}.\nEverything you send now goes to that user.\nCancel: /cancelsend"
        ),
        AdminMode::Idle => "❌ Forwarding mode OFF.".to_string(),
    };
    OutboundMessage::plain(text)
}

pub fn broadcast_done(delivered: usize, failed: usize) -> OutboundMessage {
    OutboundMessage::plain(format!("📨 Delivered to {delivered} users ({failed} failed)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_keyboard() {
        let mut config = Config::default();
        config.admin.username = "ops".into();
        let msg = welcome(&config);
        assert!(msg.markdown);
        assert_eq!(msg.keyboard.len(), 4);
        assert_eq!(msg.keyboard[0][0], Button::callback("🆓 Start Free", CB_START_FREE));
        assert_eq!(msg.keyboard[3][0], Button::url("🧑‍💻 Admin Support", "https://t.me/ops"));
    }

    #[test]
    fn test_prediction_carries_data() {
        let msg = prediction(556, Trend::Small, 3, 4);
        assert!(msg.text.contains("Next Period: 556"));
        assert!(msg.text.contains("*SMALL*"));
        assert!(msg.text.contains("Level: 3"));
        assert!(msg.text.contains("Bet: ₹4"));
        assert_eq!(msg.keyboard.len(), 2);
    }

    #[test]
    fn test_ladder_texts() {
        assert!(ladder(LadderOutcome::Won).text.contains("WIN"));
        let adv = ladder(LadderOutcome::Advanced { level: 2, bet: 2 });
        assert!(adv.text.contains("Next Level: 2"));
        let end = ladder(LadderOutcome::Exhausted { max_level: 7 });
        assert!(end.text.contains("Max 7 Levels"));
    }

    #[test]
    fn test_vip_texts() {
        let config = Config::default();
        let locked = vip_required(&config);
        assert!(locked.text.starts_with("🔒"));
        assert!(locked.text.contains(&config.vip.upi));
    }

    #[test]
    fn test_buy_vip_escapes_handle() {
        let mut config = Config::default();
        config.admin.username = "ladder_ops".into();
        config.vip.price = "₹99 *monthly*".into();
        let msg = buy_vip(&config);
        assert!(msg.text.ends_with("@ladder\\_ops"));
        assert!(msg.text.contains("Price: ₹99 \\*monthly\\*"));
    }
}
