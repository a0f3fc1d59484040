use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `sendMessage` text limit, counted in UTF-16 code units.
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Minimal Telegram Bot API client: long polling in, text and inline keyboards out.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram API error {code:?}: {description}")]
    Api {
        code: Option<i32>,
        description: String,
    },

    #[error("telegram API returned ok without a result")]
    MissingResult,
}

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// The Telegram user that produced this update, if any.
    pub fn sender(&self) -> Option<&TgUser> {
        if let Some(message) = &self.message {
            return message.from.as_ref();
        }
        self.callback_query.as_ref().map(|q| &q.from)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<TgUser>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: &'a [Vec<InlineKeyboardButton>],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

impl TelegramClient {
    /// `poll_timeout_secs` is the long-poll window; the HTTP timeout is kept above it.
    pub fn new(api_url: &str, token: &str, poll_timeout_secs: u64) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs.saturating_add(10)))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, TelegramError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await?;

        let parsed: TgResponse<T> = response.json().await?;
        if !parsed.ok {
            return Err(TelegramError::Api {
                code: parsed.error_code,
                description: parsed.description.unwrap_or_default(),
            });
        }
        parsed.result.ok_or(TelegramError::MissingResult)
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: &["message", "callback_query"],
        };
        self.call("getUpdates", &request).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&[Vec<InlineKeyboardButton>]>,
    ) -> Result<(), TelegramError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_markup: keyboard.map(|rows| InlineKeyboardMarkup {
                inline_keyboard: rows,
            }),
        };
        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        tracing::debug!(chat_id = chat_id, "telegram message sent");
        Ok(())
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), TelegramError> {
        let request = AnswerCallbackRequest {
            callback_query_id,
            text,
        };
        let _: bool = self.call("answerCallbackQuery", &request).await?;
        Ok(())
    }

    /// Cheap authenticated call used at startup to verify the token.
    pub async fn get_me(&self) -> Result<TgUser, TelegramError> {
        self.call("getMe", &serde_json::json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_update() {
        let raw = r#"{
            "update_id": 42,
            "message": {
                "message_id": 7,
                "from": {"id": 1001, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "chat": {"id": 1001, "type": "private"},
                "text": "/find"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.update_id, 42);
        assert_eq!(update.sender().unwrap().id, 1001);
        assert_eq!(update.message.unwrap().text.as_deref(), Some("/find"));
    }

    #[test]
    fn parses_callback_update() {
        let raw = r#"{
            "update_id": 43,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 2002, "first_name": "Lin"},
                "data": "toggle_interest_3"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.is_none());
        assert_eq!(update.sender().unwrap().id, 2002);
        assert_eq!(
            update.callback_query.unwrap().data.as_deref(),
            Some("toggle_interest_3")
        );
    }

    #[test]
    fn api_error_response_parses() {
        let raw = r#"{"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}"#;
        let parsed: TgResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error_code, Some(403));
    }

    #[test]
    fn keyboard_serializes_as_inline_markup() {
        let rows = vec![vec![InlineKeyboardButton {
            text: "✅ Music".into(),
            callback_data: "toggle_interest_2".into(),
        }]];
        let request = SendMessageRequest {
            chat_id: 5,
            text: "pick",
            reply_markup: Some(InlineKeyboardMarkup {
                inline_keyboard: &rows,
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "toggle_interest_2"
        );
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let client = TelegramClient::new("https://api.telegram.org/", "123:abc", 30).unwrap();
        assert_eq!(client.base_url, "https://api.telegram.org/bot123:abc");
    }
}
