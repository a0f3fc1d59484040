use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use chatmate_shared::AppResult;

use super::completion::{profile_completion_status, ProfileCompletionStatus};
use crate::models::{Gender, LookingFor, UserPatch, MAX_AGE, MIN_AGE};
use crate::store::ProfileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardStep {
    Age,
    Gender,
    LookingFor,
    City,
    Bio,
    Interests,
}

impl WizardStep {
    pub const ORDER: [WizardStep; 6] = [
        Self::Age,
        Self::Gender,
        Self::LookingFor,
        Self::City,
        Self::Bio,
        Self::Interests,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Gender => "gender",
            Self::LookingFor => "looking_for",
            Self::City => "city",
            Self::Bio => "bio",
            Self::Interests => "interests",
        }
    }

    pub fn from_field(field: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|s| s.as_str() == field)
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Self::Age => "🎂 How old are you?",
            Self::Gender => "👤 What's your gender?\n\n🔹 Male\n🔹 Female\n🔹 Other",
            Self::LookingFor => "💕 Who would you like to chat with?\n\n🔹 Male\n🔹 Female\n🔹 Anyone",
            Self::City => "🏙️ Which city are you from?",
            Self::Bio => "📝 Tell us a bit about yourself! (Write a short bio)",
            Self::Interests => "🎯 Let's add your interests! Type /interests to manage them.",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            Self::Age => "Please enter a valid age (13-100).",
            Self::Gender => "Please choose: Male, Female, or Other",
            Self::LookingFor => "Please choose: Male, Female, or Anyone",
            Self::City => "Please enter your city name.",
            Self::Bio => "Please write a bio with more than 10 characters.",
            Self::Interests => "",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected wizard input. Recovered by re-prompting, never surfaced as an `AppError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid {step}: {hint}")]
pub struct ValidationFailed {
    pub step: WizardStep,
    pub hint: &'static str,
}

impl ValidationFailed {
    fn at(step: WizardStep) -> Self {
        Self { step, hint: step.hint() }
    }
}

// --- Validators ---

pub fn parse_age(text: &str) -> Option<i32> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<i32>()
        .ok()
        .filter(|age| (MIN_AGE..=MAX_AGE).contains(age))
}

pub fn parse_gender(text: &str) -> Option<Gender> {
    match text.trim().to_lowercase().as_str() {
        "male" | "m" => Some(Gender::Male),
        "female" | "f" => Some(Gender::Female),
        "other" | "o" => Some(Gender::Other),
        _ => None,
    }
}

pub fn parse_looking_for(text: &str) -> Option<LookingFor> {
    match text.trim().to_lowercase().as_str() {
        "male" | "m" => Some(LookingFor::Male),
        "female" | "f" => Some(LookingFor::Female),
        "anyone" | "a" => Some(LookingFor::Anyone),
        _ => None,
    }
}

pub fn normalize_city(text: &str) -> Option<String> {
    let city = text.trim();
    (!city.is_empty()).then(|| title_case(city))
}

pub fn normalize_bio(text: &str) -> Option<String> {
    let bio = text.trim();
    (bio.chars().count() > 10).then(|| bio.to_string())
}

/// Capitalise the first letter of every run of letters and lowercase the rest,
/// so "new york" and "SAINT-ÉTIENNE" become "New York" and "Saint-Étienne".
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Validate `text` for `step` and return the partial update to persist.
pub fn validate_step(step: WizardStep, text: &str) -> Result<UserPatch, ValidationFailed> {
    let mut patch = UserPatch::default();
    match step {
        WizardStep::Age => patch.age = Some(parse_age(text).ok_or(ValidationFailed::at(step))?),
        WizardStep::Gender => patch.gender = Some(parse_gender(text).ok_or(ValidationFailed::at(step))?),
        WizardStep::LookingFor => {
            patch.looking_for = Some(parse_looking_for(text).ok_or(ValidationFailed::at(step))?)
        }
        WizardStep::City => patch.city = Some(normalize_city(text).ok_or(ValidationFailed::at(step))?),
        WizardStep::Bio => patch.bio = Some(normalize_bio(text).ok_or(ValidationFailed::at(step))?),
        WizardStep::Interests => {}
    }
    Ok(patch)
}

// --- Wizard ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome {
    /// Input accepted; the wizard now waits on `next`.
    Advanced { next: WizardStep },
    /// Input rejected; the wizard stays where it was.
    Rejected(ValidationFailed),
    /// No wizard state remains for the user.
    Completed { status: ProfileCompletionStatus },
    /// Input was stored, but the dialogue was abandoned (or restarted)
    /// while that happened. The wizard state is left as the other party set it.
    Interrupted,
}

impl WizardOutcome {
    pub fn advanced(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Per-user wizard progress. Entries exist only while a dialogue is in
/// progress and are dropped on completion or abandonment.
pub struct ProfileWizard {
    profiles: Arc<dyn ProfileStore>,
    states: DashMap<i64, WizardStep>,
}

impl ProfileWizard {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            profiles,
            states: DashMap::new(),
        }
    }

    /// Start (or restart) the wizard at the first missing field.
    /// Returns `None` and clears any state if the profile is already complete.
    pub fn begin(&self, user_id: i64) -> AppResult<Option<WizardStep>> {
        let status = profile_completion_status(self.profiles.as_ref(), user_id)?;
        match status.next_missing().and_then(WizardStep::from_field) {
            Some(step) => {
                self.states.insert(user_id, step);
                tracing::debug!(user_id, step = %step, "wizard started");
                Ok(Some(step))
            }
            None => {
                self.states.remove(&user_id);
                Ok(None)
            }
        }
    }

    pub fn current_step(&self, user_id: i64) -> Option<WizardStep> {
        self.states.get(&user_id).map(|entry| *entry)
    }

    pub fn step_prompt(&self, user_id: i64) -> Option<&'static str> {
        self.current_step(user_id).map(WizardStep::prompt)
    }

    pub fn is_active(&self, user_id: i64) -> bool {
        self.states.contains_key(&user_id)
    }

    pub fn abandon(&self, user_id: i64) -> bool {
        let removed = self.states.remove(&user_id).is_some();
        if removed {
            tracing::debug!(user_id, "wizard abandoned");
        }
        removed
    }

    /// Feed one message into the wizard. `None` if the user has no wizard in progress.
    pub fn handle_input(&self, user_id: i64, text: &str) -> AppResult<Option<WizardOutcome>> {
        let Some(step) = self.current_step(user_id) else {
            return Ok(None);
        };

        let patch = match validate_step(step, text) {
            Ok(patch) => patch,
            Err(failed) => {
                metrics::counter!("wizard_inputs_total", "step" => step.as_str(), "result" => "rejected")
                    .increment(1);
                tracing::debug!(user_id, step = %step, "wizard input rejected");
                return Ok(Some(WizardOutcome::Rejected(failed)));
            }
        };
        metrics::counter!("wizard_inputs_total", "step" => step.as_str(), "result" => "accepted").increment(1);

        if !patch.is_empty() {
            self.profiles.upsert_user(user_id, &patch)?;
        }

        let status = profile_completion_status(self.profiles.as_ref(), user_id)?;
        let next = match step {
            // The interests step always finishes the dialogue.
            WizardStep::Interests => None,
            _ => status.next_missing().and_then(WizardStep::from_field),
        };

        // Only move an entry that is still on the step this input answered.
        let outcome = match next {
            Some(next) => match self.states.get_mut(&user_id) {
                Some(mut entry) if *entry == step => {
                    *entry = next;
                    tracing::debug!(user_id, from = %step, to = %next, "wizard advanced");
                    WizardOutcome::Advanced { next }
                }
                _ => WizardOutcome::Interrupted,
            },
            None => match self.states.remove_if(&user_id, |_, current| *current == step) {
                Some(_) => {
                    tracing::info!(user_id, complete = status.complete, "wizard completed");
                    WizardOutcome::Completed { status }
                }
                None => WizardOutcome::Interrupted,
            },
        };
        if outcome == WizardOutcome::Interrupted {
            tracing::debug!(user_id, step = %step, "wizard left while input was stored");
        }
        Ok(Some(outcome))
    }

    /// Finish a wizard waiting on the interests step once the user has
    /// recorded at least one interest. Returns `true` if it completed.
    pub fn interests_changed(&self, user_id: i64) -> AppResult<bool> {
        if self.current_step(user_id) != Some(WizardStep::Interests) {
            return Ok(false);
        }
        if self.profiles.get_user_interests(user_id)?.is_empty() {
            return Ok(false);
        }
        let removed = self
            .states
            .remove_if(&user_id, |_, step| *step == WizardStep::Interests)
            .is_some();
        if removed {
            tracing::info!(user_id, "wizard completed from interest selection");
        }
        Ok(removed)
    }
}
