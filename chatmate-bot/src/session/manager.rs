use std::sync::Arc;

use chrono::{DateTime, Utc};

use chatmate_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{ChatMessage, ChatSession, NewChatMessage, SessionEnd};
use crate::store::SessionStore;

pub const END_REASON_STOPPED: &str = "stopped";
pub const END_REASON_TIMEOUT: &str = "timeout";
pub const END_REASON_ADMIN: &str = "admin";

/// A logged message and who it should be delivered to.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayReceipt {
    pub partner_id: i64,
    pub message: ChatMessage,
}

/// Owns the `none -> active -> ended` lifecycle. Ended sessions are never reopened.
pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    max_message_length: usize,
}

impl SessionManager {
    /// `max_message_length` is counted in UTF-16 code units, the unit the transport limits.
    pub fn new(sessions: Arc<dyn SessionStore>, max_message_length: usize) -> Self {
        Self {
            sessions,
            max_message_length,
        }
    }

    /// Pair two users. The store performs the busy check and both flag flips
    /// as one atomic step, so a racing start for either user sees `AlreadyInChat`.
    pub fn start(&self, user_a: i64, user_b: i64) -> AppResult<ChatSession> {
        let session = self.sessions.create_session(user_a, user_b)?;
        metrics::counter!("chat_sessions_started_total").increment(1);
        tracing::info!(
            session_id = session.id,
            user1_id = session.user1_id,
            user2_id = session.user2_id,
            "chat session started"
        );
        Ok(session)
    }

    pub fn relay(&self, session_id: i64, sender_id: i64, text: &str) -> AppResult<RelayReceipt> {
        let session = self.load(session_id)?;
        let partner_id = session.partner_of(sender_id).ok_or_else(|| {
            AppError::new(
                ErrorCode::NotParticipant,
                format!("user {sender_id} is not part of session {session_id}"),
            )
        })?;
        if !session.is_active() {
            return Err(AppError::new(ErrorCode::SessionNotActive, "chat session has ended"));
        }

        let length = text.encode_utf16().count();
        if length > self.max_message_length {
            return Err(AppError::with_details(
                ErrorCode::MessageTooLong,
                "message is too long",
                serde_json::json!({ "length": length, "max": self.max_message_length }),
            ));
        }

        // The store re-checks the status, so an End racing this relay wins cleanly.
        let message = self
            .sessions
            .append_message(&NewChatMessage::text(session_id, sender_id, text))?;
        metrics::counter!("chat_messages_relayed_total").increment(1);
        tracing::debug!(session_id, sender_id, partner_id, "message logged for relay");

        Ok(RelayReceipt { partner_id, message })
    }

    /// End on behalf of a participant and return the partner's id.
    /// Ending an already-ended session returns the same partner.
    pub fn end(&self, session_id: i64, by_user: i64) -> AppResult<i64> {
        let session = self.load(session_id)?;
        let partner_id = session.partner_of(by_user).ok_or_else(|| {
            AppError::new(
                ErrorCode::NotParticipant,
                format!("user {by_user} is not part of session {session_id}"),
            )
        })?;
        self.end_session(session_id, END_REASON_STOPPED)?;
        Ok(partner_id)
    }

    /// End regardless of who asks. Used by the reaper and the admin API.
    /// Exactly one of several concurrent calls reports `transitioned`.
    pub fn end_session(&self, session_id: i64, reason: &str) -> AppResult<SessionEnd> {
        let ended = self
            .sessions
            .end_session(session_id, reason)?
            .ok_or_else(|| session_not_found(session_id))?;

        if ended.transitioned {
            metrics::counter!("chat_sessions_ended_total", "reason" => reason.to_string()).increment(1);
            tracing::info!(session_id, reason, "chat session ended");
        } else {
            tracing::debug!(session_id, "end requested for an already ended session");
        }
        Ok(ended)
    }

    pub fn get_active_session(&self, user_id: i64) -> AppResult<Option<ChatSession>> {
        self.sessions.get_active_session(user_id)
    }

    pub fn get_session(&self, session_id: i64) -> AppResult<Option<ChatSession>> {
        self.sessions.get_session(session_id)
    }

    pub fn history(&self, session_id: i64) -> AppResult<Vec<ChatMessage>> {
        self.sessions.list_messages(session_id)
    }

    /// End every active session started before `cutoff`. Returns the sessions
    /// this call actually ended.
    pub fn expire_started_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ChatSession>> {
        let stale = self.sessions.list_active_sessions_started_before(cutoff)?;
        let mut ended = Vec::with_capacity(stale.len());
        for session in stale {
            match self.end_session(session.id, END_REASON_TIMEOUT) {
                Ok(end) if end.transitioned => ended.push(end.session),
                Ok(_) => {}
                Err(err) => tracing::warn!(session_id = session.id, error = %err, "failed to expire session"),
            }
        }
        Ok(ended)
    }

    fn load(&self, session_id: i64) -> AppResult<ChatSession> {
        self.sessions
            .get_session(session_id)?
            .ok_or_else(|| session_not_found(session_id))
    }
}

fn session_not_found(session_id: i64) -> AppError {
    AppError::new(ErrorCode::SessionNotFound, format!("session {session_id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, LookingFor, UserPatch};
    use crate::store::{MemoryStore, ProfileStore};

    fn setup(users: i64) -> (Arc<MemoryStore>, SessionManager) {
        let store = Arc::new(MemoryStore::default());
        for id in 1..=users {
            store
                .upsert_user(
                    id,
                    &UserPatch {
                        age: Some(25),
                        gender: Some(Gender::Other),
                        looking_for: Some(LookingFor::Anyone),
                        ..UserPatch::default()
                    },
                )
                .unwrap();
        }
        let manager = SessionManager::new(store.clone(), 20);
        (store, manager)
    }

    #[test]
    fn concurrent_start_for_the_same_user_has_one_winner() {
        for _ in 0..50 {
            let (store, manager) = setup(3);

            let results: Vec<AppResult<ChatSession>> = std::thread::scope(|s| {
                let a = s.spawn(|| manager.start(1, 2));
                let b = s.spawn(|| manager.start(1, 3));
                vec![a.join().unwrap(), b.join().unwrap()]
            });

            let wins = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(wins, 1);
            let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
            assert!(loser.is(ErrorCode::AlreadyInChat));

            let busy = [2, 3]
                .into_iter()
                .filter(|id| store.get_user(*id).unwrap().unwrap().is_in_chat)
                .count();
            assert_eq!(busy, 1);
        }
    }

    #[test]
    fn start_rejects_self_and_busy_users() {
        let (_store, manager) = setup(3);
        assert!(manager.start(1, 1).unwrap_err().is(ErrorCode::CannotChatWithSelf));

        manager.start(1, 2).unwrap();
        assert!(manager.start(2, 3).unwrap_err().is(ErrorCode::AlreadyInChat));
        assert!(manager.get_active_session(3).unwrap().is_none());
    }

    #[test]
    fn relay_returns_partner_and_logs() {
        let (_store, manager) = setup(2);
        let session = manager.start(1, 2).unwrap();

        let receipt = manager.relay(session.id, 2, "hello there").unwrap();
        assert_eq!(receipt.partner_id, 1);
        assert_eq!(receipt.message.body, "hello there");
        assert_eq!(manager.history(session.id).unwrap().len(), 1);
    }

    #[test]
    fn relay_misuse_is_rejected() {
        let (_store, manager) = setup(3);
        let session = manager.start(1, 2).unwrap();

        assert!(manager.relay(session.id, 3, "hi").unwrap_err().is(ErrorCode::NotParticipant));
        assert!(manager
            .relay(session.id, 1, &"x".repeat(21))
            .unwrap_err()
            .is(ErrorCode::MessageTooLong));
        assert!(manager.relay(999, 1, "hi").unwrap_err().is(ErrorCode::SessionNotFound));

        manager.end(session.id, 1).unwrap();
        assert!(manager.relay(session.id, 2, "hi").unwrap_err().is(ErrorCode::SessionNotActive));
        assert!(manager.history(session.id).unwrap().is_empty());
    }

    #[test]
    fn end_is_idempotent() {
        let (store, manager) = setup(2);
        let session = manager.start(1, 2).unwrap();

        assert_eq!(manager.end(session.id, 1).unwrap(), 2);
        assert_eq!(manager.end(session.id, 1).unwrap(), 2);
        assert_eq!(manager.end(session.id, 2).unwrap(), 1);

        let stored = manager.get_session(session.id).unwrap().unwrap();
        assert!(!stored.is_active());
        assert!(stored.ended_at.is_some());
        assert!(!store.get_user(1).unwrap().unwrap().is_in_chat);
        assert!(!store.get_user(2).unwrap().unwrap().is_in_chat);
    }

    #[test]
    fn concurrent_ends_report_one_transition() {
        let (_store, manager) = setup(2);
        let session = manager.start(1, 2).unwrap();

        let transitions: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| manager.end_session(session.id, END_REASON_ADMIN).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().transitioned).collect()
        });

        assert_eq!(transitions.iter().filter(|t| **t).count(), 1);
        assert!(!manager.get_session(session.id).unwrap().unwrap().is_active());
    }

    #[test]
    fn end_by_outsider_is_rejected() {
        let (_store, manager) = setup(3);
        let session = manager.start(1, 2).unwrap();
        assert!(manager.end(session.id, 3).unwrap_err().is(ErrorCode::NotParticipant));
        assert!(manager.get_active_session(1).unwrap().is_some());
    }

    #[test]
    fn new_session_after_end_is_a_new_record() {
        let (_store, manager) = setup(2);
        let first = manager.start(1, 2).unwrap();
        manager.end(first.id, 2).unwrap();

        let second = manager.start(2, 1).unwrap();
        assert_ne!(first.id, second.id);
        assert!(!manager.get_session(first.id).unwrap().unwrap().is_active());
        assert_eq!(manager.get_active_session(1).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn expiry_ends_only_old_sessions() {
        let (_store, manager) = setup(4);
        let old = manager.start(1, 2).unwrap();
        let cutoff = Utc::now() + chrono::Duration::seconds(1);

        let expired = manager.expire_started_before(cutoff).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);
        assert_eq!(expired[0].end_reason.as_deref(), Some(END_REASON_TIMEOUT));

        let recent = manager.start(3, 4).unwrap();
        let expired = manager.expire_started_before(recent.started_at).unwrap();
        assert!(expired.is_empty());
        assert!(manager.get_session(recent.id).unwrap().unwrap().is_active());
    }
}
