use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use chatmate_shared::errors::{AppError, AppResult, ErrorCode};

use super::{sort_interests, ProfileStore, SessionStore};
use crate::models::{
    Candidate, CandidateFilter, ChatMessage, ChatSession, Interest, InterestCategory,
    NewChatMessage, SessionEnd, SessionStatus, User, UserPatch,
};

#[derive(Default)]
struct Inner {
    users: HashMap<i64, User>,
    interests: Vec<Interest>,
    memberships: HashMap<i64, BTreeSet<i32>>,
    sessions: BTreeMap<i64, ChatSession>,
    messages: Vec<ChatMessage>,
    next_interest_id: i32,
    next_session_id: i64,
    next_message_id: i64,
}

/// Process-local store. Every call holds one mutex, which makes the
/// check-and-set in `create_session` atomic across both users.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    default_min_age: i32,
    default_max_age: i32,
}

impl MemoryStore {
    pub fn new(default_min_age: i32, default_max_age: i32) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            default_min_age,
            default_max_age,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(18, 100)
    }
}

fn interest_by_id(inner: &Inner, interest_id: i32) -> AppResult<&Interest> {
    inner
        .interests
        .iter()
        .find(|i| i.id == interest_id)
        .ok_or_else(|| AppError::new(ErrorCode::InterestNotFound, format!("interest {interest_id} not found")))
}

impl ProfileStore for MemoryStore {
    fn get_user(&self, user_id: i64) -> AppResult<Option<User>> {
        Ok(self.inner.lock().users.get(&user_id).cloned())
    }

    fn upsert_user(&self, user_id: i64, patch: &UserPatch) -> AppResult<User> {
        let mut inner = self.inner.lock();
        let user = inner
            .users
            .entry(user_id)
            .or_insert_with(|| User::new(user_id, self.default_min_age, self.default_max_age));
        user.apply(patch);
        Ok(user.clone())
    }

    fn get_user_interests(&self, user_id: i64) -> AppResult<Vec<Interest>> {
        let inner = self.inner.lock();
        let Some(ids) = inner.memberships.get(&user_id) else {
            return Ok(Vec::new());
        };
        let mut interests: Vec<Interest> = inner
            .interests
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect();
        sort_interests(&mut interests);
        Ok(interests)
    }

    fn list_interests(&self) -> AppResult<Vec<Interest>> {
        let mut interests = self.inner.lock().interests.clone();
        sort_interests(&mut interests);
        Ok(interests)
    }

    fn add_user_interest(&self, user_id: i64, interest_id: i32) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        interest_by_id(&inner, interest_id)?;
        if !inner.users.contains_key(&user_id) {
            return Err(AppError::new(ErrorCode::UserNotFound, format!("user {user_id} not found")));
        }
        Ok(inner.memberships.entry(user_id).or_default().insert(interest_id))
    }

    fn remove_user_interest(&self, user_id: i64, interest_id: i32) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        Ok(inner
            .memberships
            .get_mut(&user_id)
            .map_or(false, |ids| ids.remove(&interest_id)))
    }

    fn seed_interests(&self, interests: &[(&str, InterestCategory)]) -> AppResult<usize> {
        let mut inner = self.inner.lock();
        let mut inserted = 0;
        for (name, category) in interests {
            if inner.interests.iter().any(|i| i.name == *name) {
                continue;
            }
            inner.next_interest_id += 1;
            let id = inner.next_interest_id;
            inner.interests.push(Interest {
                id,
                name: (*name).to_string(),
                category: *category,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    fn find_candidates(&self, filter: &CandidateFilter) -> AppResult<Vec<Candidate>> {
        let inner = self.inner.lock();
        let empty = BTreeSet::new();
        let mine = inner.memberships.get(&filter.requester_id).unwrap_or(&empty);

        let mut pool: Vec<Candidate> = inner
            .users
            .values()
            .filter(|u| filter.admits(u))
            .map(|u| {
                let theirs = inner.memberships.get(&u.user_id).unwrap_or(&empty);
                Candidate {
                    user: u.clone(),
                    shared_interests: mine.intersection(theirs).count() as u32,
                }
            })
            .collect();

        // Shuffle first so the stable sort leaves equal counts in random order.
        pool.shuffle(&mut rand::thread_rng());
        pool.sort_by(|a, b| b.shared_interests.cmp(&a.shared_interests));
        pool.truncate(filter.limit);
        Ok(pool)
    }

    fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

impl SessionStore for MemoryStore {
    fn create_session(&self, user1_id: i64, user2_id: i64) -> AppResult<ChatSession> {
        if user1_id == user2_id {
            return Err(AppError::new(ErrorCode::CannotChatWithSelf, "cannot chat with yourself"));
        }

        let mut inner = self.inner.lock();
        for id in [user1_id, user2_id] {
            match inner.users.get(&id) {
                None => {
                    return Err(AppError::new(ErrorCode::UserNotFound, format!("user {id} not found")));
                }
                Some(u) if u.is_in_chat => {
                    return Err(AppError::new(
                        ErrorCode::AlreadyInChat,
                        format!("user {id} is already in a chat"),
                    ));
                }
                Some(_) => {}
            }
        }

        for id in [user1_id, user2_id] {
            if let Some(u) = inner.users.get_mut(&id) {
                u.is_in_chat = true;
            }
        }

        inner.next_session_id += 1;
        let session = ChatSession {
            id: inner.next_session_id,
            user1_id,
            user2_id,
            status: SessionStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
            end_reason: None,
        };
        inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    fn get_session(&self, session_id: i64) -> AppResult<Option<ChatSession>> {
        Ok(self.inner.lock().sessions.get(&session_id).cloned())
    }

    fn get_active_session(&self, user_id: i64) -> AppResult<Option<ChatSession>> {
        Ok(self
            .inner
            .lock()
            .sessions
            .values()
            .find(|s| s.is_active() && s.involves(user_id))
            .cloned())
    }

    fn end_session(&self, session_id: i64, reason: &str) -> AppResult<Option<SessionEnd>> {
        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        if !session.is_active() {
            return Ok(Some(SessionEnd {
                session: session.clone(),
                transitioned: false,
            }));
        }

        session.status = SessionStatus::Ended;
        session.ended_at = Some(Utc::now());
        session.end_reason = Some(reason.to_string());
        let ended = session.clone();

        for id in [ended.user1_id, ended.user2_id] {
            if let Some(u) = inner.users.get_mut(&id) {
                u.is_in_chat = false;
            }
        }
        Ok(Some(SessionEnd {
            session: ended,
            transitioned: true,
        }))
    }

    fn append_message(&self, message: &NewChatMessage) -> AppResult<ChatMessage> {
        let mut inner = self.inner.lock();
        match inner.sessions.get(&message.session_id) {
            None => {
                return Err(AppError::new(
                    ErrorCode::SessionNotFound,
                    format!("session {} not found", message.session_id),
                ));
            }
            Some(s) if !s.is_active() => {
                return Err(AppError::new(ErrorCode::SessionNotActive, "chat session has ended"));
            }
            Some(_) => {}
        }

        inner.next_message_id += 1;
        let stored = ChatMessage {
            id: inner.next_message_id,
            session_id: message.session_id,
            sender_id: message.sender_id,
            body: message.body.clone(),
            message_type: message.message_type.clone(),
            sent_at: Utc::now(),
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    fn list_messages(&self, session_id: i64) -> AppResult<Vec<ChatMessage>> {
        Ok(self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    fn list_active_sessions_started_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ChatSession>> {
        Ok(self
            .inner
            .lock()
            .sessions
            .values()
            .filter(|s| s.is_active() && s.started_at < cutoff)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, LookingFor, DEFAULT_INTERESTS};

    fn seeded() -> MemoryStore {
        let store = MemoryStore::default();
        store.seed_interests(&DEFAULT_INTERESTS).unwrap();
        store
    }

    fn interest_id(store: &MemoryStore, name: &str) -> i32 {
        store
            .list_interests()
            .unwrap()
            .into_iter()
            .find(|i| i.name == name)
            .unwrap()
            .id
    }

    fn add_user(store: &MemoryStore, id: i64, gender: Gender, looking_for: LookingFor) {
        store
            .upsert_user(
                id,
                &UserPatch {
                    age: Some(25),
                    gender: Some(gender),
                    looking_for: Some(looking_for),
                    city: Some("Paris".into()),
                    bio: Some("I like long walks".into()),
                    ..UserPatch::default()
                },
            )
            .unwrap();
    }

    fn filter(requester_id: i64, limit: usize) -> CandidateFilter {
        CandidateFilter {
            requester_id,
            requester_gender: Gender::Male,
            requester_looking_for: LookingFor::Anyone,
            min_age: 18,
            max_age: 100,
            city: None,
            limit,
        }
    }

    #[test]
    fn seeding_is_idempotent() {
        let store = seeded();
        assert_eq!(store.seed_interests(&DEFAULT_INTERESTS).unwrap(), 0);
        assert_eq!(store.list_interests().unwrap().len(), 20);
    }

    #[test]
    fn catalogue_is_ordered_by_category_then_name() {
        let store = seeded();
        let interests = store.list_interests().unwrap();
        assert_eq!(interests[0].category, InterestCategory::Tech);
        assert_eq!(interests[0].name, "Programming");
        assert_eq!(interests[1].name, "Technology");
    }

    #[test]
    fn membership_has_no_duplicates() {
        let store = seeded();
        add_user(&store, 1, Gender::Male, LookingFor::Anyone);
        let music = interest_id(&store, "Music");

        assert!(store.add_user_interest(1, music).unwrap());
        assert!(!store.add_user_interest(1, music).unwrap());
        assert_eq!(store.get_user_interests(1).unwrap().len(), 1);

        assert!(store.remove_user_interest(1, music).unwrap());
        assert!(!store.remove_user_interest(1, music).unwrap());
    }

    #[test]
    fn unknown_interest_is_rejected() {
        let store = seeded();
        add_user(&store, 1, Gender::Male, LookingFor::Anyone);
        let err = store.add_user_interest(1, 999).unwrap_err();
        assert!(err.is(ErrorCode::InterestNotFound));
    }

    #[test]
    fn candidates_are_ranked_by_shared_interests_and_bounded() {
        let store = seeded();
        let music = interest_id(&store, "Music");
        let art = interest_id(&store, "Art");

        add_user(&store, 1, Gender::Male, LookingFor::Anyone);
        store.add_user_interest(1, music).unwrap();
        store.add_user_interest(1, art).unwrap();

        for id in 2..=6 {
            add_user(&store, id, Gender::Female, LookingFor::Anyone);
        }
        store.add_user_interest(4, music).unwrap();
        store.add_user_interest(4, art).unwrap();
        store.add_user_interest(5, art).unwrap();

        let pool = store.find_candidates(&filter(1, 3)).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool[0].user.user_id, 4);
        assert_eq!(pool[0].shared_interests, 2);
        assert_eq!(pool[1].user.user_id, 5);
        assert_eq!(pool[1].shared_interests, 1);
        assert_eq!(pool[2].shared_interests, 0);
    }

    #[test]
    fn create_session_sets_both_flags() {
        let store = seeded();
        add_user(&store, 1, Gender::Male, LookingFor::Anyone);
        add_user(&store, 2, Gender::Female, LookingFor::Anyone);

        let session = store.create_session(1, 2).unwrap();
        assert!(session.is_active());
        assert!(store.get_user(1).unwrap().unwrap().is_in_chat);
        assert!(store.get_user(2).unwrap().unwrap().is_in_chat);
        assert_eq!(store.get_active_session(2).unwrap().unwrap().id, session.id);
    }

    #[test]
    fn busy_user_blocks_session_without_side_effects() {
        let store = seeded();
        for id in 1..=3 {
            add_user(&store, id, Gender::Female, LookingFor::Anyone);
        }
        store.create_session(1, 2).unwrap();

        let err = store.create_session(3, 2).unwrap_err();
        assert!(err.is(ErrorCode::AlreadyInChat));
        assert!(!store.get_user(3).unwrap().unwrap().is_in_chat);
        assert!(store.get_active_session(3).unwrap().is_none());
    }

    #[test]
    fn append_rejects_ended_session() {
        let store = seeded();
        add_user(&store, 1, Gender::Male, LookingFor::Anyone);
        add_user(&store, 2, Gender::Female, LookingFor::Anyone);
        let session = store.create_session(1, 2).unwrap();

        store.append_message(&NewChatMessage::text(session.id, 1, "hi")).unwrap();
        store.end_session(session.id, "stopped").unwrap();

        let err = store
            .append_message(&NewChatMessage::text(session.id, 2, "too late"))
            .unwrap_err();
        assert!(err.is(ErrorCode::SessionNotActive));
        assert_eq!(store.list_messages(session.id).unwrap().len(), 1);
    }

    #[test]
    fn ended_session_keeps_first_end_details() {
        let store = seeded();
        add_user(&store, 1, Gender::Male, LookingFor::Anyone);
        add_user(&store, 2, Gender::Female, LookingFor::Anyone);
        let session = store.create_session(1, 2).unwrap();

        let first = store.end_session(session.id, "stopped").unwrap().unwrap();
        let second = store.end_session(session.id, "timeout").unwrap().unwrap();
        assert!(first.transitioned);
        assert!(!second.transitioned);
        assert_eq!(first.session, second.session);
        assert_eq!(second.session.end_reason.as_deref(), Some("stopped"));
        assert!(store.end_session(999, "stopped").unwrap().is_none());
    }
}
