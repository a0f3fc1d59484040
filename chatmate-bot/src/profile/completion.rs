use serde::Serialize;

use chatmate_shared::AppResult;

use crate::models::User;
use crate::store::ProfileStore;

/// Required fields in the order the wizard collects them.
pub const REQUIRED_FIELDS: [&str; 6] = ["age", "gender", "looking_for", "city", "bio", "interests"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileCompletionStatus {
    pub complete: bool,
    pub missing: Vec<&'static str>,
}

impl ProfileCompletionStatus {
    /// Derive the status from a stored record. An unknown user is missing everything.
    pub fn evaluate(user: Option<&User>, interest_count: usize) -> Self {
        let missing: Vec<&'static str> = match user {
            None => REQUIRED_FIELDS.to_vec(),
            Some(user) => REQUIRED_FIELDS
                .into_iter()
                .filter(|field| match *field {
                    "age" => user.age.is_none(),
                    "gender" => user.gender.is_none(),
                    "looking_for" => user.looking_for.is_none(),
                    "city" => !user.has_city(),
                    "bio" => !user.has_bio(),
                    _ => interest_count == 0,
                })
                .collect(),
        };

        Self {
            complete: missing.is_empty(),
            missing,
        }
    }

    pub fn next_missing(&self) -> Option<&'static str> {
        self.missing.first().copied()
    }
}

pub fn profile_completion_status(
    profiles: &dyn ProfileStore,
    user_id: i64,
) -> AppResult<ProfileCompletionStatus> {
    let user = profiles.get_user(user_id)?;
    let interest_count = match &user {
        Some(_) => profiles.get_user_interests(user_id)?.len(),
        None => 0,
    };
    Ok(ProfileCompletionStatus::evaluate(user.as_ref(), interest_count))
}
