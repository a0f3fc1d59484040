use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Enumerations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookingFor {
    Male,
    Female,
    Anyone,
}

impl LookingFor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Anyone => "anyone",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "anyone" => Some(Self::Anyone),
            _ => None,
        }
    }

    /// Whether this preference accepts someone of `gender`.
    pub fn accepts(self, gender: Gender) -> bool {
        match self {
            Self::Anyone => true,
            Self::Male => gender == Gender::Male,
            Self::Female => gender == Gender::Female,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InterestCategory {
    Tech,
    Entertainment,
    Culture,
    Activities,
    Lifestyle,
    Hobbies,
    Health,
    Education,
    Environment,
}

impl InterestCategory {
    pub const ALL: [InterestCategory; 9] = [
        Self::Tech,
        Self::Entertainment,
        Self::Culture,
        Self::Activities,
        Self::Lifestyle,
        Self::Hobbies,
        Self::Health,
        Self::Education,
        Self::Environment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tech => "Tech",
            Self::Entertainment => "Entertainment",
            Self::Culture => "Culture",
            Self::Activities => "Activities",
            Self::Lifestyle => "Lifestyle",
            Self::Hobbies => "Hobbies",
            Self::Health => "Health",
            Self::Education => "Education",
            Self::Environment => "Environment",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for InterestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalogue seeded at startup. Re-seeding is a no-op for names already present.
pub const DEFAULT_INTERESTS: [(&str, InterestCategory); 20] = [
    ("Technology", InterestCategory::Tech),
    ("Music", InterestCategory::Entertainment),
    ("Movies", InterestCategory::Entertainment),
    ("Books", InterestCategory::Culture),
    ("Sports", InterestCategory::Activities),
    ("Travel", InterestCategory::Lifestyle),
    ("Cooking", InterestCategory::Lifestyle),
    ("Gaming", InterestCategory::Entertainment),
    ("Art", InterestCategory::Culture),
    ("Photography", InterestCategory::Hobbies),
    ("Fitness", InterestCategory::Health),
    ("Dancing", InterestCategory::Activities),
    ("Science", InterestCategory::Education),
    ("Programming", InterestCategory::Tech),
    ("Fashion", InterestCategory::Lifestyle),
    ("Anime", InterestCategory::Entertainment),
    ("Pets", InterestCategory::Lifestyle),
    ("Nature", InterestCategory::Environment),
    ("History", InterestCategory::Education),
    ("Languages", InterestCategory::Education),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

// --- User ---

pub const MIN_AGE: i32 = 13;
pub const MAX_AGE: i32 = 100;
pub const MIN_BIO_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub city: Option<String>,
    pub bio: Option<String>,
    pub looking_for: Option<LookingFor>,
    pub min_age: i32,
    pub max_age: i32,
    pub is_active: bool,
    pub is_in_chat: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl User {
    /// A fresh record with preference defaults and nothing else set.
    pub fn new(user_id: i64, min_age: i32, max_age: i32) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username: None,
            first_name: None,
            age: None,
            gender: None,
            city: None,
            bio: None,
            looking_for: None,
            min_age,
            max_age,
            is_active: true,
            is_in_chat: false,
            created_at: now,
            last_active: now,
        }
    }

    pub fn has_city(&self) -> bool {
        self.city.as_deref().map_or(false, |c| !c.trim().is_empty())
    }

    pub fn has_bio(&self) -> bool {
        self.bio
            .as_deref()
            .map_or(false, |b| b.trim().chars().count() >= MIN_BIO_CHARS)
    }

    pub fn accepts_age(&self, age: i32) -> bool {
        (self.min_age..=self.max_age).contains(&age)
    }

    /// Apply a partial update in place. `last_active` is always bumped.
    pub fn apply(&mut self, patch: &UserPatch) {
        if let Some(v) = &patch.username {
            self.username = Some(v.clone());
        }
        if let Some(v) = &patch.first_name {
            self.first_name = Some(v.clone());
        }
        if let Some(v) = patch.age {
            self.age = Some(v);
        }
        if let Some(v) = patch.gender {
            self.gender = Some(v);
        }
        if let Some(v) = &patch.city {
            self.city = Some(v.clone());
        }
        if let Some(v) = &patch.bio {
            self.bio = Some(v.clone());
        }
        if let Some(v) = patch.looking_for {
            self.looking_for = Some(v);
        }
        if let Some(v) = patch.min_age {
            self.min_age = v;
        }
        if let Some(v) = patch.max_age {
            self.max_age = v;
        }
        if let Some(v) = patch.is_active {
            self.is_active = v;
        }
        self.last_active = Utc::now();
    }
}

/// Partial update over exactly the profile fields a caller may change.
/// `is_in_chat` is absent on purpose: only the session store flips it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub city: Option<String>,
    pub bio: Option<String>,
    pub looking_for: Option<LookingFor>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- Interest ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interest {
    pub id: i32,
    pub name: String,
    pub category: InterestCategory,
}

// --- Matching pool ---

/// A pooled user together with the precomputed count of interests shared with the requester.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub user: User,
    pub shared_interests: u32,
}

/// Hard filters for the bounded candidate fetch, derived from the requester.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFilter {
    pub requester_id: i64,
    pub requester_gender: Gender,
    pub requester_looking_for: LookingFor,
    pub min_age: i32,
    pub max_age: i32,
    pub city: Option<String>,
    pub limit: usize,
}

impl CandidateFilter {
    pub fn admits(&self, user: &User) -> bool {
        if user.user_id == self.requester_id || !user.is_active || user.is_in_chat {
            return false;
        }
        let (Some(age), Some(gender), Some(looking_for)) = (user.age, user.gender, user.looking_for)
        else {
            return false;
        };
        if !(self.min_age..=self.max_age).contains(&age) {
            return false;
        }
        if !looking_for.accepts(self.requester_gender) || !self.requester_looking_for.accepts(gender) {
            return false;
        }
        match &self.city {
            Some(city) => user
                .city
                .as_deref()
                .map_or(false, |c| c.to_lowercase() == city.to_lowercase()),
            None => true,
        }
    }
}

// --- Chat ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSession {
    pub id: i64,
    pub user1_id: i64,
    pub user2_id: i64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
}

impl ChatSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn involves(&self, user_id: i64) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The other participant, or `None` if `user_id` is not in this session.
    pub fn partner_of(&self, user_id: i64) -> Option<i64> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

/// Outcome of an end request.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEnd {
    pub session: ChatSession,
    /// `true` only for the request that moved the session from active to ended.
    pub transitioned: bool,
}

pub const MESSAGE_TYPE_TEXT: &str = "text";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub sender_id: i64,
    pub body: String,
    pub message_type: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub session_id: i64,
    pub sender_id: i64,
    pub body: String,
    pub message_type: String,
}

impl NewChatMessage {
    pub fn text(session_id: i64, sender_id: i64, body: impl Into<String>) -> Self {
        Self {
            session_id,
            sender_id,
            body: body.into(),
            message_type: MESSAGE_TYPE_TEXT.into(),
        }
    }
}
