use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use chatmate_shared::AppResult;

use super::manager::SessionManager;
use crate::bot::messages;
use crate::transport::Transport;

/// End sessions older than `timeout` and tell both participants.
pub async fn sweep(
    manager: &SessionManager,
    transport: &dyn Transport,
    timeout: Duration,
) -> AppResult<usize> {
    let timeout = chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(36_500));
    let cutoff = chrono::Utc::now()
        .checked_sub_signed(timeout)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

    let expired = manager.expire_started_before(cutoff)?;
    for session in &expired {
        for user_id in [session.user1_id, session.user2_id] {
            if let Err(e) = transport.send_text(user_id, messages::CHAT_TIMED_OUT).await {
                tracing::warn!(session_id = session.id, user_id, error = %e, "failed to notify timeout");
            }
        }
    }
    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "reaper ended stale sessions");
    }
    Ok(expired.len())
}

/// Spawn the periodic sweep. `None` when `timeout` is zero.
pub fn spawn(
    manager: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if timeout.is_zero() {
        tracing::info!("session timeout disabled, reaper not started");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            if let Err(e) = sweep(&manager, transport.as_ref(), timeout).await {
                tracing::error!(error = %e, "reaper sweep failed");
            }
        }
    }))
}
