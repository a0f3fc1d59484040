use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Integer, Nullable, Varchar};

use chatmate_shared::clients::db::DbPool;
use chatmate_shared::errors::{AppError, AppResult, ErrorCode};

use super::{sort_interests, ProfileStore, SessionStore};
use crate::models::{
    Candidate, CandidateFilter, ChatMessage, ChatSession, Gender, Interest, InterestCategory,
    LookingFor, NewChatMessage, SessionEnd, SessionStatus, User, UserPatch,
};
use crate::schema::{chat_messages, chat_sessions, interests, user_interests, users};

type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

// --- Rows ---

#[derive(Debug, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct UserRow {
    user_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    age: Option<i32>,
    gender: Option<String>,
    city: Option<String>,
    bio: Option<String>,
    looking_for: Option<String>,
    min_age: i32,
    max_age: i32,
    is_active: bool,
    is_in_chat: bool,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let gender = row.gender.as_deref().and_then(|g| {
            let parsed = Gender::from_db(g);
            if parsed.is_none() {
                tracing::warn!(user_id = row.user_id, gender = g, "unknown gender in users row");
            }
            parsed
        });
        let looking_for = row.looking_for.as_deref().and_then(|l| {
            let parsed = LookingFor::from_db(l);
            if parsed.is_none() {
                tracing::warn!(user_id = row.user_id, looking_for = l, "unknown preference in users row");
            }
            parsed
        });

        User {
            user_id: row.user_id,
            username: row.username,
            first_name: row.first_name,
            age: row.age,
            gender,
            city: row.city,
            bio: row.bio,
            looking_for,
            min_age: row.min_age,
            max_age: row.max_age,
            is_active: row.is_active,
            is_in_chat: row.is_in_chat,
            created_at: row.created_at,
            last_active: row.last_active,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
struct NewUserRow<'a> {
    user_id: i64,
    username: Option<&'a str>,
    first_name: Option<&'a str>,
    age: Option<i32>,
    gender: Option<&'static str>,
    city: Option<&'a str>,
    bio: Option<&'a str>,
    looking_for: Option<&'static str>,
    min_age: i32,
    max_age: i32,
    is_active: bool,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = users)]
struct UserChangeset<'a> {
    username: Option<&'a str>,
    first_name: Option<&'a str>,
    age: Option<i32>,
    gender: Option<&'static str>,
    city: Option<&'a str>,
    bio: Option<&'a str>,
    looking_for: Option<&'static str>,
    min_age: Option<i32>,
    max_age: Option<i32>,
    is_active: Option<bool>,
}

impl<'a> From<&'a UserPatch> for UserChangeset<'a> {
    fn from(patch: &'a UserPatch) -> Self {
        Self {
            username: patch.username.as_deref(),
            first_name: patch.first_name.as_deref(),
            age: patch.age,
            gender: patch.gender.map(Gender::as_str),
            city: patch.city.as_deref(),
            bio: patch.bio.as_deref(),
            looking_for: patch.looking_for.map(LookingFor::as_str),
            min_age: patch.min_age,
            max_age: patch.max_age,
            is_active: patch.is_active,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = interests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct InterestRow {
    id: i32,
    name: String,
    category: String,
}

impl InterestRow {
    fn into_interest(self) -> Option<Interest> {
        match InterestCategory::from_db(&self.category) {
            Some(category) => Some(Interest {
                id: self.id,
                name: self.name,
                category,
            }),
            None => {
                tracing::warn!(interest_id = self.id, category = %self.category, "skipping interest with unknown category");
                None
            }
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = interests)]
struct NewInterestRow<'a> {
    name: &'a str,
    category: &'static str,
}

#[derive(Debug, QueryableByName)]
struct CandidateRow {
    #[diesel(embed)]
    user: UserRow,
    #[diesel(sql_type = BigInt)]
    shared_interests: i64,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = chat_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct SessionRow {
    id: i64,
    user1_id: i64,
    user2_id: i64,
    status: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    end_reason: Option<String>,
}

impl From<SessionRow> for ChatSession {
    fn from(row: SessionRow) -> Self {
        let status = SessionStatus::from_db(&row.status).unwrap_or_else(|| {
            tracing::warn!(session_id = row.id, status = %row.status, "unknown session status, treating as ended");
            SessionStatus::Ended
        });
        ChatSession {
            id: row.id,
            user1_id: row.user1_id,
            user2_id: row.user2_id,
            status,
            started_at: row.started_at,
            ended_at: row.ended_at,
            end_reason: row.end_reason,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_sessions)]
struct NewSessionRow {
    user1_id: i64,
    user2_id: i64,
    status: &'static str,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct MessageRow {
    id: i64,
    session_id: i64,
    sender_id: i64,
    body: String,
    message_type: String,
    sent_at: DateTime<Utc>,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        ChatMessage {
            id: row.id,
            session_id: row.session_id,
            sender_id: row.sender_id,
            body: row.body,
            message_type: row.message_type,
            sent_at: row.sent_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_messages)]
struct NewMessageRow<'a> {
    session_id: i64,
    sender_id: i64,
    body: &'a str,
    message_type: &'a str,
}

// --- Store ---

const FIND_CANDIDATES_SQL: &str = r#"
    SELECT u.*, COALESCE(s.shared, 0) AS shared_interests
    FROM users u
    LEFT JOIN (
        SELECT ui.user_id, COUNT(*) AS shared
        FROM user_interests ui
        JOIN user_interests mine
          ON mine.interest_id = ui.interest_id AND mine.user_id = $1
        GROUP BY ui.user_id
    ) s ON s.user_id = u.user_id
    WHERE u.user_id <> $1
      AND u.is_active
      AND NOT u.is_in_chat
      AND u.age BETWEEN $2 AND $3
      AND u.looking_for IN ($4, 'anyone')
      AND ($5 = 'anyone' OR u.gender = $5)
      AND ($6::varchar IS NULL OR LOWER(u.city) = LOWER($6))
    ORDER BY shared_interests DESC, RANDOM()
    LIMIT $7
"#;

/// Postgres-backed store. Multi-row invariants are enforced inside transactions.
pub struct PgStore {
    pool: DbPool,
    default_min_age: i32,
    default_max_age: i32,
}

impl PgStore {
    pub fn new(pool: DbPool, default_min_age: i32, default_max_age: i32) -> Self {
        Self {
            pool,
            default_min_age,
            default_max_age,
        }
    }

    fn conn(&self) -> AppResult<PgPooled> {
        self.pool
            .get()
            .map_err(|e| AppError::unavailable(format!("database unavailable: {e}")))
    }
}

fn is_unique_violation(err: &DieselError) -> bool {
    matches!(err, DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
}

impl ProfileStore for PgStore {
    fn get_user(&self, user_id: i64) -> AppResult<Option<User>> {
        let mut conn = self.conn()?;
        let row = users::table
            .find(user_id)
            .select(UserRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(User::from))
    }

    fn upsert_user(&self, user_id: i64, patch: &UserPatch) -> AppResult<User> {
        let mut conn = self.conn()?;

        let new_row = NewUserRow {
            user_id,
            username: patch.username.as_deref(),
            first_name: patch.first_name.as_deref(),
            age: patch.age,
            gender: patch.gender.map(Gender::as_str),
            city: patch.city.as_deref(),
            bio: patch.bio.as_deref(),
            looking_for: patch.looking_for.map(LookingFor::as_str),
            min_age: patch.min_age.unwrap_or(self.default_min_age),
            max_age: patch.max_age.unwrap_or(self.default_max_age),
            is_active: patch.is_active.unwrap_or(true),
        };
        let changeset = UserChangeset::from(patch);

        let row = diesel::insert_into(users::table)
            .values(&new_row)
            .on_conflict(users::user_id)
            .do_update()
            .set((&changeset, users::last_active.eq(Utc::now())))
            .returning(UserRow::as_returning())
            .get_result(&mut conn)?;

        Ok(row.into())
    }

    fn get_user_interests(&self, user_id: i64) -> AppResult<Vec<Interest>> {
        let mut conn = self.conn()?;
        let rows = user_interests::table
            .inner_join(interests::table)
            .filter(user_interests::user_id.eq(user_id))
            .select(InterestRow::as_select())
            .load(&mut conn)?;

        let mut result: Vec<Interest> = rows.into_iter().filter_map(InterestRow::into_interest).collect();
        sort_interests(&mut result);
        Ok(result)
    }

    fn list_interests(&self) -> AppResult<Vec<Interest>> {
        let mut conn = self.conn()?;
        let rows = interests::table
            .select(InterestRow::as_select())
            .load(&mut conn)?;

        let mut result: Vec<Interest> = rows.into_iter().filter_map(InterestRow::into_interest).collect();
        sort_interests(&mut result);
        Ok(result)
    }

    fn add_user_interest(&self, user_id: i64, interest_id: i32) -> AppResult<bool> {
        let mut conn = self.conn()?;

        let exists: i64 = interests::table
            .filter(interests::id.eq(interest_id))
            .count()
            .get_result(&mut conn)?;
        if exists == 0 {
            return Err(AppError::new(
                ErrorCode::InterestNotFound,
                format!("interest {interest_id} not found"),
            ));
        }

        let inserted = diesel::insert_into(user_interests::table)
            .values((
                user_interests::user_id.eq(user_id),
                user_interests::interest_id.eq(interest_id),
            ))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    AppError::new(ErrorCode::UserNotFound, format!("user {user_id} not found"))
                }
                other => AppError::Database(other),
            })?;

        Ok(inserted == 1)
    }

    fn remove_user_interest(&self, user_id: i64, interest_id: i32) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let removed = diesel::delete(
            user_interests::table
                .filter(user_interests::user_id.eq(user_id))
                .filter(user_interests::interest_id.eq(interest_id)),
        )
        .execute(&mut conn)?;
        Ok(removed > 0)
    }

    fn seed_interests(&self, catalogue: &[(&str, InterestCategory)]) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let rows: Vec<NewInterestRow<'_>> = catalogue
            .iter()
            .map(|(name, category)| NewInterestRow {
                name,
                category: category.as_str(),
            })
            .collect();

        let inserted = diesel::insert_into(interests::table)
            .values(&rows)
            .on_conflict(interests::name)
            .do_nothing()
            .execute(&mut conn)?;
        Ok(inserted)
    }

    fn find_candidates(&self, filter: &CandidateFilter) -> AppResult<Vec<Candidate>> {
        let mut conn = self.conn()?;
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);

        let rows: Vec<CandidateRow> = diesel::sql_query(FIND_CANDIDATES_SQL)
            .bind::<BigInt, _>(filter.requester_id)
            .bind::<Integer, _>(filter.min_age)
            .bind::<Integer, _>(filter.max_age)
            .bind::<Varchar, _>(filter.requester_gender.as_str())
            .bind::<Varchar, _>(filter.requester_looking_for.as_str())
            .bind::<Nullable<Varchar>, _>(filter.city.as_deref())
            .bind::<BigInt, _>(limit)
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|row| Candidate {
                user: row.user.into(),
                shared_interests: u32::try_from(row.shared_interests).unwrap_or(0),
            })
            .collect())
    }

    fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}

impl SessionStore for PgStore {
    fn create_session(&self, user1_id: i64, user2_id: i64) -> AppResult<ChatSession> {
        if user1_id == user2_id {
            return Err(AppError::new(ErrorCode::CannotChatWithSelf, "cannot chat with yourself"));
        }
        let mut conn = self.conn()?;
        let pair = [user1_id.min(user2_id), user1_id.max(user2_id)];

        conn.transaction::<ChatSession, AppError, _>(|conn| {
            // Lock both rows in id order so concurrent starts cannot deadlock.
            let locked: Vec<(i64, bool)> = users::table
                .filter(users::user_id.eq_any(pair))
                .order(users::user_id.asc())
                .select((users::user_id, users::is_in_chat))
                .for_update()
                .load(conn)?;

            if locked.len() != 2 {
                return Err(AppError::new(ErrorCode::UserNotFound, "chat participant not found"));
            }
            if let Some((busy_id, _)) = locked.iter().find(|(_, in_chat)| *in_chat) {
                return Err(AppError::new(
                    ErrorCode::AlreadyInChat,
                    format!("user {busy_id} is already in a chat"),
                ));
            }

            diesel::update(users::table.filter(users::user_id.eq_any(pair)))
                .set(users::is_in_chat.eq(true))
                .execute(conn)?;

            let row = diesel::insert_into(chat_sessions::table)
                .values(&NewSessionRow {
                    user1_id,
                    user2_id,
                    status: SessionStatus::Active.as_str(),
                })
                .returning(SessionRow::as_returning())
                .get_result(conn)
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        AppError::new(ErrorCode::AlreadyInChat, "participant already has an active chat")
                    } else {
                        AppError::Database(e)
                    }
                })?;

            Ok(row.into())
        })
    }

    fn get_session(&self, session_id: i64) -> AppResult<Option<ChatSession>> {
        let mut conn = self.conn()?;
        let row = chat_sessions::table
            .find(session_id)
            .select(SessionRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(ChatSession::from))
    }

    fn get_active_session(&self, user_id: i64) -> AppResult<Option<ChatSession>> {
        let mut conn = self.conn()?;
        let row = chat_sessions::table
            .filter(
                chat_sessions::user1_id
                    .eq(user_id)
                    .or(chat_sessions::user2_id.eq(user_id)),
            )
            .filter(chat_sessions::status.eq(SessionStatus::Active.as_str()))
            .select(SessionRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(ChatSession::from))
    }

    fn end_session(&self, session_id: i64, reason: &str) -> AppResult<Option<SessionEnd>> {
        let mut conn = self.conn()?;

        conn.transaction::<Option<SessionEnd>, AppError, _>(|conn| {
            let current = chat_sessions::table
                .find(session_id)
                .select(SessionRow::as_select())
                .for_update()
                .first(conn)
                .optional()?;

            let Some(current) = current else {
                return Ok(None);
            };
            if current.status != SessionStatus::Active.as_str() {
                return Ok(Some(SessionEnd {
                    session: current.into(),
                    transitioned: false,
                }));
            }

            let ended = diesel::update(chat_sessions::table.find(session_id))
                .set((
                    chat_sessions::status.eq(SessionStatus::Ended.as_str()),
                    chat_sessions::ended_at.eq(Some(Utc::now())),
                    chat_sessions::end_reason.eq(Some(reason)),
                ))
                .returning(SessionRow::as_returning())
                .get_result(conn)?;

            diesel::update(users::table.filter(users::user_id.eq_any([ended.user1_id, ended.user2_id])))
                .set(users::is_in_chat.eq(false))
                .execute(conn)?;

            Ok(Some(SessionEnd {
                session: ended.into(),
                transitioned: true,
            }))
        })
    }

    fn append_message(&self, message: &NewChatMessage) -> AppResult<ChatMessage> {
        let mut conn = self.conn()?;

        conn.transaction::<ChatMessage, AppError, _>(|conn| {
            let status: Option<String> = chat_sessions::table
                .find(message.session_id)
                .select(chat_sessions::status)
                .for_share()
                .first(conn)
                .optional()?;

            match status.as_deref() {
                None => {
                    return Err(AppError::new(
                        ErrorCode::SessionNotFound,
                        format!("session {} not found", message.session_id),
                    ));
                }
                Some(s) if s != SessionStatus::Active.as_str() => {
                    return Err(AppError::new(ErrorCode::SessionNotActive, "chat session has ended"));
                }
                Some(_) => {}
            }

            let row = diesel::insert_into(chat_messages::table)
                .values(&NewMessageRow {
                    session_id: message.session_id,
                    sender_id: message.sender_id,
                    body: &message.body,
                    message_type: &message.message_type,
                })
                .returning(MessageRow::as_returning())
                .get_result(conn)?;

            Ok(row.into())
        })
    }

    fn list_messages(&self, session_id: i64) -> AppResult<Vec<ChatMessage>> {
        let mut conn = self.conn()?;
        let rows = chat_messages::table
            .filter(chat_messages::session_id.eq(session_id))
            .order((chat_messages::sent_at.asc(), chat_messages::id.asc()))
            .select(MessageRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    fn list_active_sessions_started_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ChatSession>> {
        let mut conn = self.conn()?;
        let rows = chat_sessions::table
            .filter(chat_sessions::status.eq(SessionStatus::Active.as_str()))
            .filter(chat_sessions::started_at.lt(cutoff))
            .order(chat_sessions::started_at.asc())
            .select(SessionRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(ChatSession::from).collect())
    }
}

/// Run against a migrated database with
/// `DATABASE_URL=postgres://... cargo test -p chatmate-bot -- --ignored`.
#[cfg(test)]
mod tests {
    use super::*;
    use chatmate_shared::clients::db::create_pool;

    use crate::models::DEFAULT_INTERESTS;

    fn store() -> Option<PgStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = create_pool(&url, 4).unwrap();
        Some(PgStore::new(pool, 18, 100))
    }

    /// A block of ids no real Telegram user has, fresh for every run.
    fn id_block(size: i64) -> Vec<i64> {
        let base = -(i64::from(rand::random::<u32>()) + 1) * 64;
        (0..size).map(|i| base - i).collect()
    }

    fn cleanup(store: &PgStore, ids: &[i64]) {
        let mut conn = store.conn().unwrap();
        let sessions = chat_sessions::table
            .filter(chat_sessions::user1_id.eq_any(ids.to_vec()).or(chat_sessions::user2_id.eq_any(ids.to_vec())))
            .select(chat_sessions::id);
        diesel::delete(chat_messages::table.filter(chat_messages::session_id.eq_any(sessions)))
            .execute(&mut conn)
            .unwrap();
        diesel::delete(
            chat_sessions::table
                .filter(chat_sessions::user1_id.eq_any(ids.to_vec()).or(chat_sessions::user2_id.eq_any(ids.to_vec()))),
        )
        .execute(&mut conn)
        .unwrap();
        diesel::delete(users::table.filter(users::user_id.eq_any(ids.to_vec())))
            .execute(&mut conn)
            .unwrap();
    }

    fn profile(age: i32, gender: Gender, looking_for: LookingFor, city: &str) -> UserPatch {
        UserPatch {
            age: Some(age),
            gender: Some(gender),
            looking_for: Some(looking_for),
            city: Some(city.to_string()),
            bio: Some("Weekend hikes and board games".into()),
            ..UserPatch::default()
        }
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn concurrent_create_session_books_a_user_once() {
        let Some(store) = store() else { return };
        let ids = id_block(3);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        for id in &ids {
            store.upsert_user(*id, &UserPatch::default()).unwrap();
        }

        let results: Vec<AppResult<ChatSession>> = std::thread::scope(|scope| {
            let first = scope.spawn(|| store.create_session(a, b));
            let second = scope.spawn(|| store.create_session(c, a));
            vec![first.join().unwrap(), second.join().unwrap()]
        });

        let winners: Vec<&ChatSession> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(loser.is(ErrorCode::AlreadyInChat));

        let session = winners[0].clone();
        assert_eq!(store.get_active_session(a).unwrap().unwrap().id, session.id);
        let partner = session.partner_of(a).unwrap();
        let bystander = if partner == b { c } else { b };
        assert!(store.get_user(partner).unwrap().unwrap().is_in_chat);
        assert!(!store.get_user(bystander).unwrap().unwrap().is_in_chat);

        let first = store.end_session(session.id, "stopped").unwrap().unwrap();
        let second = store.end_session(session.id, "admin").unwrap().unwrap();
        assert!(first.transitioned);
        assert!(!second.transitioned);
        assert_eq!(second.session.end_reason.as_deref(), Some("stopped"));
        assert!(!store.get_user(a).unwrap().unwrap().is_in_chat);
        assert!(store
            .append_message(&NewChatMessage::text(session.id, a, "late"))
            .unwrap_err()
            .is(ErrorCode::SessionNotActive));

        cleanup(&store, &ids);
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn candidate_query_filters_and_counts_shared_interests() {
        let Some(store) = store() else { return };
        store.seed_interests(&DEFAULT_INTERESTS).unwrap();
        let catalogue = store.list_interests().unwrap();
        let interest = |name: &str| catalogue.iter().find(|i| i.name == name).unwrap().id;

        let ids = id_block(6);
        let city = format!("Testville {}", -ids[0]);
        let (requester, close, plain, picky, wrong_gender, too_old) =
            (ids[0], ids[1], ids[2], ids[3], ids[4], ids[5]);

        store
            .upsert_user(
                requester,
                &UserPatch {
                    max_age: Some(40),
                    ..profile(30, Gender::Male, LookingFor::Female, &city)
                },
            )
            .unwrap();
        store.upsert_user(close, &profile(28, Gender::Female, LookingFor::Male, &city)).unwrap();
        store
            .upsert_user(plain, &profile(31, Gender::Female, LookingFor::Anyone, &city.to_lowercase()))
            .unwrap();
        store.upsert_user(picky, &profile(29, Gender::Female, LookingFor::Female, &city)).unwrap();
        store.upsert_user(wrong_gender, &profile(29, Gender::Male, LookingFor::Anyone, &city)).unwrap();
        store.upsert_user(too_old, &profile(60, Gender::Female, LookingFor::Male, &city)).unwrap();

        for name in ["Music", "Art"] {
            store.add_user_interest(requester, interest(name)).unwrap();
            store.add_user_interest(close, interest(name)).unwrap();
        }
        store.add_user_interest(plain, interest("Travel")).unwrap();

        let requester_user = store.get_user(requester).unwrap().unwrap();
        let filter = CandidateFilter {
            requester_id: requester,
            requester_gender: Gender::Male,
            requester_looking_for: LookingFor::Female,
            min_age: requester_user.min_age,
            max_age: requester_user.max_age,
            city: Some(city.clone()),
            limit: 10,
        };
        let found = store.find_candidates(&filter).unwrap();

        let ids_found: Vec<i64> = found.iter().map(|c| c.user.user_id).collect();
        assert_eq!(ids_found, vec![close, plain]);
        assert_eq!(found[0].shared_interests, 2);
        assert_eq!(found[1].shared_interests, 0);
        assert!(found.iter().all(|c| filter.admits(&c.user)));

        let capped = store.find_candidates(&CandidateFilter { limit: 1, ..filter }).unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].user.user_id, close);

        cleanup(&store, &ids);
    }
}
