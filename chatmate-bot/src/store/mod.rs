//! Record-store seams the core talks to.
//!
//! Both traits are synchronous: the Postgres implementation runs diesel on a
//! pooled connection with a bounded checkout timeout, and the in-memory
//! implementation holds a single mutex for the duration of each call.

pub mod memory;
pub mod pg;

use chrono::{DateTime, Utc};

use chatmate_shared::AppResult;

use crate::models::{
    Candidate, CandidateFilter, ChatMessage, ChatSession, Interest, InterestCategory,
    NewChatMessage, SessionEnd, User, UserPatch,
};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Users, the interest catalogue and user/interest membership.
pub trait ProfileStore: Send + Sync {
    fn get_user(&self, user_id: i64) -> AppResult<Option<User>>;

    /// Create the user if missing, then apply every present field of `patch`.
    fn upsert_user(&self, user_id: i64, patch: &UserPatch) -> AppResult<User>;

    fn get_user_interests(&self, user_id: i64) -> AppResult<Vec<Interest>>;

    /// Whole catalogue, ordered by category then name.
    fn list_interests(&self) -> AppResult<Vec<Interest>>;

    /// Returns `true` if the membership was added, `false` if it already existed.
    fn add_user_interest(&self, user_id: i64, interest_id: i32) -> AppResult<bool>;

    /// Returns `true` if a membership was removed.
    fn remove_user_interest(&self, user_id: i64, interest_id: i32) -> AppResult<bool>;

    /// Insert catalogue entries whose names are not present yet.
    fn seed_interests(&self, interests: &[(&str, InterestCategory)]) -> AppResult<usize>;

    /// Bounded filtered fetch. At most `filter.limit` users admitted by
    /// `filter`, ordered by shared-interest count descending with random
    /// ordering among equal counts.
    fn find_candidates(&self, filter: &CandidateFilter) -> AppResult<Vec<Candidate>>;

    /// Liveness probe for the health endpoint.
    fn ping(&self) -> AppResult<()>;
}

/// Chat sessions and the append-only message log.
pub trait SessionStore: Send + Sync {
    /// Atomically check that neither user is in a chat, set both `is_in_chat`
    /// flags and insert an active session. Fails with `AlreadyInChat` without
    /// side effects if either user is busy.
    fn create_session(&self, user1_id: i64, user2_id: i64) -> AppResult<ChatSession>;

    fn get_session(&self, session_id: i64) -> AppResult<Option<ChatSession>>;

    fn get_active_session(&self, user_id: i64) -> AppResult<Option<ChatSession>>;

    /// Transition to ended and clear both flags. Already-ended sessions are
    /// returned unchanged with `transitioned = false`, so concurrent callers
    /// agree on which of them ended it. `None` if the session does not exist.
    fn end_session(&self, session_id: i64, reason: &str) -> AppResult<Option<SessionEnd>>;

    /// Append to the log if the session is still active, else `SessionNotActive`.
    fn append_message(&self, message: &NewChatMessage) -> AppResult<ChatMessage>;

    fn list_messages(&self, session_id: i64) -> AppResult<Vec<ChatMessage>>;

    fn list_active_sessions_started_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ChatSession>>;
}

/// Catalogue order shared by every backend: category declaration order, then name.
pub(crate) fn sort_interests(interests: &mut [Interest]) {
    interests.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
}
