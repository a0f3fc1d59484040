pub mod telegram;

use async_trait::async_trait;

use chatmate_shared::clients::telegram::{InlineKeyboardButton, TelegramError};

pub use telegram::TelegramTransport;

/// Outbound delivery could not reach its recipient. Logged by the caller and
/// reported to the sender as a warning; never rolls back session state.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Telegram(#[from] TelegramError),

    #[error("recipient {0} is unreachable")]
    Unreachable(i64),
}

pub type Keyboard = Vec<Vec<InlineKeyboardButton>>;

pub fn button(text: impl Into<String>, data: impl Into<String>) -> InlineKeyboardButton {
    InlineKeyboardButton {
        text: text.into(),
        callback_data: data.into(),
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, user_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_keyboard(
        &self,
        user_id: i64,
        text: &str,
        keyboard: &[Vec<InlineKeyboardButton>],
    ) -> Result<(), TransportError>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), TransportError>;
}

#[cfg(test)]
pub mod recording {
    use std::collections::HashSet;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Sent {
        pub user_id: i64,
        pub text: String,
        pub keyboard: Option<Keyboard>,
    }

    /// Captures outbound traffic; users marked unreachable fail delivery.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<Sent>>,
        answered: Mutex<Vec<String>>,
        unreachable: Mutex<HashSet<i64>>,
    }

    impl RecordingTransport {
        pub fn make_unreachable(&self, user_id: i64) {
            self.unreachable.lock().insert(user_id);
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().clone()
        }

        pub fn sent_to(&self, user_id: i64) -> Vec<Sent> {
            self.sent.lock().iter().filter(|s| s.user_id == user_id).cloned().collect()
        }

        pub fn last_text_to(&self, user_id: i64) -> Option<String> {
            self.sent_to(user_id).pop().map(|s| s.text)
        }

        pub fn answered(&self) -> Vec<String> {
            self.answered.lock().clone()
        }

        pub fn clear(&self) {
            self.sent.lock().clear();
        }

        fn record(&self, user_id: i64, text: &str, keyboard: Option<Keyboard>) -> Result<(), TransportError> {
            if self.unreachable.lock().contains(&user_id) {
                return Err(TransportError::Unreachable(user_id));
            }
            self.sent.lock().push(Sent {
                user_id,
                text: text.to_string(),
                keyboard,
            });
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(&self, user_id: i64, text: &str) -> Result<(), TransportError> {
            self.record(user_id, text, None)
        }

        async fn send_keyboard(
            &self,
            user_id: i64,
            text: &str,
            keyboard: &[Vec<InlineKeyboardButton>],
        ) -> Result<(), TransportError> {
            self.record(user_id, text, Some(keyboard.to_vec()))
        }

        async fn answer_callback(&self, callback_id: &str, _text: Option<&str>) -> Result<(), TransportError> {
            self.answered.lock().push(callback_id.to_string());
            Ok(())
        }
    }
}
