//! Telegram Bot API transport.
//!
//! Wire structs mirror the subset of the Bot API the bot reads. They are
//! converted once into [`Inbound`] events whose message content is a tagged
//! [`Payload`], and everything downstream matches on that.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::error::TransportError;
use crate::record::UserId;

pub type ChatId = i64;

// ---- wire types -----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub callback_query: Option<WireCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireUser {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<WireUser>,
    pub chat: WireChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<FileRef>>,
    #[serde(default)]
    pub video: Option<FileRef>,
    #[serde(default)]
    pub voice: Option<FileRef>,
    #[serde(default)]
    pub audio: Option<FileRef>,
    #[serde(default)]
    pub document: Option<FileRef>,
    #[serde(default)]
    pub sticker: Option<FileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCallbackQuery {
    pub id: String,
    pub from: WireUser,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

// ---- domain events --------------------------------------------------------

/// Message content, one variant per media kind the bot can re-send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Photo { file_id: String, caption: Option<String> },
    Video { file_id: String, caption: Option<String> },
    Voice { file_id: String },
    Audio { file_id: String },
    Document { file_id: String, caption: Option<String> },
    Sticker { file_id: String },
    /// Anything else; can only be forwarded as-is
    Other,
}

impl Payload {
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl From<&WireMessage> for Payload {
    fn from(msg: &WireMessage) -> Self {
        let caption = msg.caption.clone();
        if let Some(text) = &msg.text {
            return Payload::Text(text.clone());
        }
        // Telegram lists photo sizes smallest first
        if let Some(largest) = msg.photo.as_ref().and_then(|sizes| sizes.last()) {
            return Payload::Photo {
                file_id: largest.file_id.clone(),
                caption,
            };
        }
        if let Some(v) = &msg.video {
            return Payload::Video {
                file_id: v.file_id.clone(),
                caption,
            };
        }
        if let Some(v) = &msg.voice {
            return Payload::Voice {
                file_id: v.file_id.clone(),
            };
        }
        if let Some(a) = &msg.audio {
            return Payload::Audio {
                file_id: a.file_id.clone(),
            };
        }
        if let Some(d) = &msg.document {
            return Payload::Document {
                file_id: d.file_id.clone(),
                caption,
            };
        }
        if let Some(s) = &msg.sticker {
            return Payload::Sticker {
                file_id: s.file_id.clone(),
            };
        }
        Payload::Other
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: i64,
    pub chat_id: ChatId,
    pub from: Option<UserId>,
    pub payload: Payload,
}

impl From<&WireMessage> for InboundMessage {
    fn from(msg: &WireMessage) -> Self {
        Self {
            message_id: msg.message_id,
            chat_id: msg.chat.id,
            from: msg.from.as_ref().map(|u| u.id),
            payload: Payload::from(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub id: String,
    pub from: UserId,
    /// Chat of the message carrying the button, if Telegram still has it
    pub chat_id: Option<ChatId>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(InboundMessage),
    Callback(CallbackEvent),
}

impl Update {
    pub fn into_inbound(self) -> Option<Inbound> {
        if let Some(msg) = &self.message {
            return Some(Inbound::Message(InboundMessage::from(msg)));
        }
        self.callback_query.map(|q| {
            Inbound::Callback(CallbackEvent {
                id: q.id,
                from: q.from.id,
                chat_id: q.message.as_ref().map(|m| m.chat.id),
                data: q.data,
            })
        })
    }
}

// ---- outbound -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Button {
    Callback { text: String, callback_data: String },
    Url { text: String, url: String },
}

impl Button {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Button::Callback {
            text: text.into(),
            callback_data: data.into(),
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Button::Url {
            text: text.into(),
            url: url.into(),
        }
    }
}

/// A text message with optional Markdown and inline keyboard
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub text: String,
    pub markdown: bool,
    pub keyboard: Vec<Vec<Button>>,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: true,
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// Build the `sendMessage` request body
pub fn send_message_request(chat_id: ChatId, message: &OutboundMessage) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": message.text,
    });
    if message.markdown {
        body["parse_mode"] = json!("Markdown");
    }
    if !message.keyboard.is_empty() {
        body["reply_markup"] = json!({ "inline_keyboard": message.keyboard });
    }
    body
}

/// Pick the API method and body that re-sends `message` to `target`
pub fn forward_request(target: ChatId, message: &InboundMessage) -> (&'static str, Value) {
    let caption = |c: &Option<String>| c.clone().unwrap_or_default();
    match &message.payload {
        Payload::Text(text) => (
            "sendMessage",
            json!({ "chat_id": target, "text": text, "disable_web_page_preview": false }),
        ),
        Payload::Photo { file_id, caption: c } => (
            "sendPhoto",
            json!({ "chat_id": target, "photo": file_id, "caption": caption(c) }),
        ),
        Payload::Video { file_id, caption: c } => (
            "sendVideo",
            json!({ "chat_id": target, "video": file_id, "caption": caption(c) }),
        ),
        Payload::Voice { file_id } => (
            "sendVoice",
            json!({ "chat_id": target, "voice": file_id }),
        ),
        Payload::Audio { file_id } => (
            "sendAudio",
            json!({ "chat_id": target, "audio": file_id }),
        ),
        Payload::Document { file_id, caption: c } => (
            "sendDocument",
            json!({ "chat_id": target, "document": file_id, "caption": caption(c) }),
        ),
        Payload::Sticker { file_id } => (
            "sendSticker",
            json!({ "chat_id": target, "sticker": file_id }),
        ),
        Payload::Other => (
            "forwardMessage",
            json!({
                "chat_id": target,
                "from_chat_id": message.chat_id,
                "message_id": message.message_id
            }),
        ),
    }
}

/// Outbound seam used by the router
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutboundMessage,
    ) -> Result<(), TransportError>;

    /// Re-send an inbound message to another chat
    async fn forward(&self, target: ChatId, message: &InboundMessage)
        -> Result<(), TransportError>;

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError>;
}

/// Telegram Bot API client over HTTPS
pub struct TelegramClient {
    client: Client,
    base_url: String,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, token: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            // long polls hold the connection for poll_timeout_secs
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<T, TransportError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.client.post(&url).json(body).send().await?;
        let parsed: ApiResponse<T> = response.json().await?;

        if !parsed.ok {
            return Err(TransportError::Api {
                code: parsed.error_code.unwrap_or_default(),
                description: parsed.description.unwrap_or_default(),
            });
        }
        parsed
            .result
            .ok_or_else(|| TransportError::Malformed(format!("{method}: missing result")))
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), offset, "updates received");
        }
        Ok(updates)
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        let body = send_message_request(chat_id, message);
        let _: Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn forward(
        &self,
        target: ChatId,
        message: &InboundMessage,
    ) -> Result<(), TransportError> {
        let (method, body) = forward_request(target, message);
        let result: Result<Value, _> = self.call(method, &body).await;
        if let Err(e) = &result {
            warn!(chat_id = target, method, error = %e, "forward failed");
        }
        result.map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        let body = json!({ "callback_query_id": callback_id });
        let _: Value = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_text_message_update() {
        let update = parse_update(
            r#"{
                "update_id": 10,
                "message": {
                    "message_id": 3,
                    "from": {"id": 42, "is_bot": false, "first_name": "A"},
                    "chat": {"id": 42, "type": "private"},
                    "date": 1700000000,
                    "text": "555"
                }
            }"#,
        );
        assert_eq!(update.update_id, 10);
        match update.into_inbound() {
            Some(Inbound::Message(msg)) => {
                assert_eq!(msg.from, Some(42));
                assert_eq!(msg.chat_id, 42);
                assert_eq!(msg.payload.text(), Some("555"));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_callback_update() {
        let update = parse_update(
            r#"{
                "update_id": 11,
                "callback_query": {
                    "id": "cb-1",
                    "from": {"id": 7, "is_bot": false, "first_name": "B"},
                    "message": {"message_id": 9, "chat": {"id": 700}, "text": "menu"},
                    "chat_instance": "x",
                    "data": "result_win"
                }
            }"#,
        );
        assert_eq!(
            update.into_inbound(),
            Some(Inbound::Callback(CallbackEvent {
                id: "cb-1".into(),
                from: 7,
                chat_id: Some(700),
                data: Some("result_win".into()),
            }))
        );
    }

    #[test]
    fn test_unhandled_update_kind() {
        let update = parse_update(r#"{"update_id": 12, "edited_message": {}}"#);
        assert!(update.into_inbound().is_none());
    }

    #[test]
    fn test_payload_variants() {
        let base = r#""message_id": 1, "chat": {"id": 1}"#;
        let cases = [
            (
                format!(r#"{{{base}, "photo": [{{"file_id": "small"}}, {{"file_id": "big"}}], "caption": "hi"}}"#),
                Payload::Photo { file_id: "big".into(), caption: Some("hi".into()) },
            ),
            (
                format!(r#"{{{base}, "video": {{"file_id": "v"}}}}"#),
                Payload::Video { file_id: "v".into(), caption: None },
            ),
            (
                format!(r#"{{{base}, "voice": {{"file_id": "vo"}}}}"#),
                Payload::Voice { file_id: "vo".into() },
            ),
            (
                format!(r#"{{{base}, "audio": {{"file_id": "au"}}}}"#),
                Payload::Audio { file_id: "au".into() },
            ),
            (
                format!(r#"{{{base}, "document": {{"file_id": "d"}}, "caption": "doc"}}"#),
                Payload::Document { file_id: "d".into(), caption: Some("doc".into()) },
            ),
            (
                format!(r#"{{{base}, "sticker": {{"file_id": "s"}}}}"#),
                Payload::Sticker { file_id: "s".into() },
            ),
            (format!(r#"{{{base}, "location": {{"latitude": 1.0}}}}"#), Payload::Other),
        ];

        for (json, expected) in cases {
            let msg: WireMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(Payload::from(&msg), expected);
        }
    }

    #[test]
    fn test_forward_request_methods() {
        let msg = |payload| InboundMessage {
            message_id: 5,
            chat_id: 100,
            from: Some(100),
            payload,
        };

        let (method, body) = forward_request(9, &msg(Payload::Text("hey".into())));
        assert_eq!(method, "sendMessage");
        assert_eq!(body["chat_id"], 9);
        assert_eq!(body["text"], "hey");

        let (method, body) = forward_request(
            9,
            &msg(Payload::Photo { file_id: "p".into(), caption: None }),
        );
        assert_eq!(method, "sendPhoto");
        assert_eq!(body["caption"], "");

        let (method, _) = forward_request(9, &msg(Payload::Sticker { file_id: "s".into() }));
        assert_eq!(method, "sendSticker");

        let (method, body) = forward_request(9, &msg(Payload::Other));
        assert_eq!(method, "forwardMessage");
        assert_eq!(body["from_chat_id"], 100);
        assert_eq!(body["message_id"], 5);
    }

    #[test]
    fn test_send_message_request() {
        let plain = send_message_request(1, &OutboundMessage::plain("hi"));
        assert!(plain.get("parse_mode").is_none());
        assert!(plain.get("reply_markup").is_none());

        let msg = OutboundMessage::markdown("*menu*").with_keyboard(vec![
            vec![Button::callback("Free", "start_free")],
            vec![Button::url("Support", "https://t.me/ops")],
        ]);
        let body = send_message_request(1, &msg);
        assert_eq!(body["parse_mode"], "Markdown");
        let keyboard = &body["reply_markup"]["inline_keyboard"];
        assert_eq!(keyboard[0][0]["callback_data"], "start_free");
        assert_eq!(keyboard[1][0]["url"], "https://t.me/ops");
    }

    #[test]
    fn test_client_new() {
        let config = TelegramConfig::default();
        let client = TelegramClient::new(&config, "123:abc").unwrap();
        assert_eq!(client.base_url, "https://api.telegram.org/bot123:abc");
    }
}
