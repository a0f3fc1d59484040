use crate::models::{Gender, LookingFor, User};

// -- Weights --
// Linear sum; every term is non-negative so more shared interests never lowers a score.
pub const W_SHARED_INTEREST: i32 = 10;
pub const AGE_CLOSENESS_MAX: i32 = 20;
pub const SAME_CITY_BONUS: i32 = 15;
pub const GENDER_MATCH_BONUS: i32 = 25;
pub const BIO_BONUS: i32 = 5;
pub const BIO_BONUS_MIN_CHARS: usize = 20;
// Reserved for a recency signal; constant for now.
pub const ACTIVITY_BONUS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreBreakdown {
    pub shared_interests: i32,
    pub age_closeness: i32,
    pub same_city: i32,
    pub gender_match: i32,
    pub bio: i32,
    pub activity: i32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i32 {
        self.shared_interests
            + self.age_closeness
            + self.same_city
            + self.gender_match
            + self.bio
            + self.activity
    }
}

/// Both sides' stated preference accepts the other's declared gender.
pub fn is_gender_compatible(
    a_gender: Gender,
    a_looking_for: LookingFor,
    b_gender: Gender,
    b_looking_for: LookingFor,
) -> bool {
    a_looking_for.accepts(b_gender) && b_looking_for.accepts(a_gender)
}

fn age_closeness(a: Option<i32>, b: Option<i32>) -> i32 {
    match (a, b) {
        (Some(a), Some(b)) => (AGE_CLOSENESS_MAX - (a - b).abs()).max(0),
        _ => 0,
    }
}

fn same_city(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let (a, b) = (a.trim(), b.trim());
            !a.is_empty() && a.to_lowercase() == b.to_lowercase()
        }
        _ => false,
    }
}

pub fn calculate_score(requester: &User, candidate: &User, shared_interests: u32) -> ScoreBreakdown {
    let gender_ok = match (
        requester.gender,
        requester.looking_for,
        candidate.gender,
        candidate.looking_for,
    ) {
        (Some(ag), Some(al), Some(bg), Some(bl)) => is_gender_compatible(ag, al, bg, bl),
        _ => false,
    };

    let has_substantial_bio = candidate
        .bio
        .as_deref()
        .map_or(false, |b| b.trim().chars().count() > BIO_BONUS_MIN_CHARS);

    ScoreBreakdown {
        shared_interests: W_SHARED_INTEREST.saturating_mul(i32::try_from(shared_interests).unwrap_or(i32::MAX)),
        age_closeness: age_closeness(requester.age, candidate.age),
        same_city: if same_city(requester.city.as_deref(), candidate.city.as_deref()) {
            SAME_CITY_BONUS
        } else {
            0
        },
        gender_match: if gender_ok { GENDER_MATCH_BONUS } else { 0 },
        bio: if has_substantial_bio { BIO_BONUS } else { 0 },
        activity: ACTIVITY_BONUS,
    }
}
