use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use chatmate_shared::clients::telegram::{InlineKeyboardButton, TelegramClient, Update};

use super::{Transport, TransportError};
use crate::bot::handlers;
use crate::AppState;

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct TelegramTransport {
    client: TelegramClient,
}

impl TelegramTransport {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, user_id: i64, text: &str) -> Result<(), TransportError> {
        self.client.send_message(user_id, text, None).await?;
        Ok(())
    }

    async fn send_keyboard(
        &self,
        user_id: i64,
        text: &str,
        keyboard: &[Vec<InlineKeyboardButton>],
    ) -> Result<(), TransportError> {
        self.client.send_message(user_id, text, Some(keyboard)).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), TransportError> {
        self.client.answer_callback_query(callback_id, text).await?;
        Ok(())
    }
}

/// Group a poll batch by sender, keeping each sender's updates in arrival
/// order and senders in order of first appearance. Updates without a
/// sender are dropped.
pub fn group_by_user(updates: Vec<Update>) -> Vec<(i64, Vec<Update>)> {
    let mut groups: Vec<(i64, Vec<Update>)> = Vec::new();
    for update in updates {
        let Some(user_id) = update.sender().map(|u| u.id) else {
            tracing::debug!(update_id = update.update_id, "skipping update without sender");
            continue;
        };
        match groups.iter_mut().find(|(id, _)| *id == user_id) {
            Some((_, queue)) => queue.push(update),
            None => groups.push((user_id, vec![update])),
        }
    }
    groups
}

/// Run one batch: each user's updates sequentially on their own task,
/// different users concurrently. Returns once every task has finished.
pub async fn dispatch_batch(state: Arc<AppState>, updates: Vec<Update>) {
    let mut tasks = JoinSet::new();
    for (user_id, queue) in group_by_user(updates) {
        let state = state.clone();
        tasks.spawn(async move {
            for update in queue {
                handlers::handle_update(&state, update).await;
            }
            user_id
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "update task panicked");
        }
    }
}

/// Long-poll `getUpdates` forever, acknowledging each batch by advancing the offset.
pub async fn run_polling(client: TelegramClient, state: Arc<AppState>, poll_timeout_secs: u64) {
    let mut offset: Option<i64> = None;
    tracing::info!("telegram polling started");

    loop {
        let updates = match client.get_updates(offset, poll_timeout_secs).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "getUpdates failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };
        if updates.is_empty() {
            continue;
        }

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            offset = Some(last + 1);
        }
        tracing::debug!(count = updates.len(), "dispatching update batch");
        dispatch_batch(state.clone(), updates).await;
    }
}
