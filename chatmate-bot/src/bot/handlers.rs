use chatmate_shared::clients::telegram::{CallbackQuery, TgUser, Update};
use chatmate_shared::errors::{AppResult, ErrorCode};

use super::messages;
use crate::models::UserPatch;
use crate::profile::wizard::{normalize_bio, normalize_city, parse_age, parse_looking_for};
use crate::profile::{profile_completion_status, WizardOutcome, WizardStep};
use crate::AppState;

/// Entry point for one inbound update. Errors are logged and reported to the
/// sender; nothing here is fatal to the process.
pub async fn handle_update(state: &AppState, update: Update) {
    let Some(sender) = update.sender().cloned() else {
        return;
    };
    if sender.is_bot {
        return;
    }
    let user_id = sender.id;

    let result = if let Some(query) = update.callback_query {
        on_callback(state, &sender, query).await
    } else if let Some(text) = update.message.and_then(|m| m.text) {
        on_message(state, &sender, &text).await
    } else {
        Ok(())
    };

    if let Err(err) = result {
        tracing::error!(user_id, error = %err, "failed to handle update");
        reply(state, user_id, messages::UNEXPECTED_ERROR).await;
    }
}

/// Split "/cmd@bot rest" into ("cmd", "rest").
pub fn parse_command(text: &str) -> Option<(String, &str)> {
    let body = text.trim().strip_prefix('/')?;
    let (head, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    (!name.is_empty()).then(|| (name, args.trim()))
}

async fn on_message(state: &AppState, sender: &TgUser, text: &str) -> AppResult<()> {
    match parse_command(text) {
        Some((command, args)) => on_command(state, sender, &command, args).await,
        None => on_text(state, sender.id, text).await,
    }
}

async fn on_command(state: &AppState, sender: &TgUser, command: &str, args: &str) -> AppResult<()> {
    let user_id = sender.id;
    tracing::debug!(user_id, command, "command received");
    match command {
        "start" => start(state, sender).await,
        "help" => {
            reply(state, user_id, messages::HELP).await;
            Ok(())
        }
        "profile" => show_profile(state, user_id).await,
        "find" => find(state, user_id).await,
        "stop" => stop(state, user_id).await,
        "interests" => show_interests(state, user_id).await,
        "settings" => settings(state, user_id, args).await,
        _ => {
            reply(state, user_id, messages::UNKNOWN_COMMAND).await;
            Ok(())
        }
    }
}

// --- Commands ---

async fn start(state: &AppState, sender: &TgUser) -> AppResult<()> {
    let user_id = sender.id;
    let existed = state.profiles.get_user(user_id)?.is_some();
    let user = state.profiles.upsert_user(
        user_id,
        &UserPatch {
            username: sender.username.clone(),
            first_name: Some(sender.first_name.clone()),
            ..UserPatch::default()
        },
    )?;

    match state.wizard.begin(user_id)? {
        Some(step) if !existed => {
            let text = format!("{}\n\n{}", messages::WELCOME_NEW, step.prompt());
            reply(state, user_id, &text).await;
        }
        Some(step) => reply(state, user_id, step.prompt()).await,
        None => reply(state, user_id, &messages::welcome_back(&user)).await,
    }
    Ok(())
}

async fn show_profile(state: &AppState, user_id: i64) -> AppResult<()> {
    let Some(user) = state.profiles.get_user(user_id)? else {
        reply(state, user_id, messages::START_FIRST).await;
        return Ok(());
    };
    let interests = state.profiles.get_user_interests(user_id)?;
    reply(state, user_id, &messages::profile(&user, &interests)).await;
    Ok(())
}

async fn find(state: &AppState, user_id: i64) -> AppResult<()> {
    let status = profile_completion_status(state.profiles.as_ref(), user_id)?;
    if !status.complete {
        reply(state, user_id, &messages::profile_incomplete(&status)).await;
        return Ok(());
    }
    if state.sessions.get_active_session(user_id)?.is_some() {
        reply(state, user_id, messages::ALREADY_IN_CHAT).await;
        return Ok(());
    }
    // A complete profile has nothing left for the wizard to collect.
    state.wizard.abandon(user_id);

    reply(state, user_id, messages::SEARCHING).await;

    for attempt in 1..=state.config.find_attempts {
        let Some(candidate) = state.matcher.select_match(user_id)? else {
            break;
        };
        let partner_id = candidate.user.user_id;

        match state.sessions.start(user_id, partner_id) {
            Ok(_) => {
                state.wizard.abandon(partner_id);
                announce_match(state, user_id, partner_id).await?;
                return Ok(());
            }
            Err(err) if err.is(ErrorCode::AlreadyInChat) => {
                if state.sessions.get_active_session(user_id)?.is_some() {
                    reply(state, user_id, messages::ALREADY_IN_CHAT).await;
                    return Ok(());
                }
                tracing::debug!(user_id, partner_id, attempt, "partner was taken, selecting again");
            }
            Err(err) => return Err(err),
        }
    }

    reply(state, user_id, messages::NO_MATCH).await;
    Ok(())
}

async fn announce_match(state: &AppState, user_id: i64, partner_id: i64) -> AppResult<()> {
    let (Some(user), Some(partner)) = (state.profiles.get_user(user_id)?, state.profiles.get_user(partner_id)?)
    else {
        return Ok(());
    };
    let user_interests = state.profiles.get_user_interests(user_id)?;
    let partner_interests = state.profiles.get_user_interests(partner_id)?;

    reply(state, user_id, &messages::match_found(&partner, &partner_interests)).await;
    deliver(state, partner_id, &messages::match_found(&user, &user_interests)).await;
    Ok(())
}

async fn stop(state: &AppState, user_id: i64) -> AppResult<()> {
    let Some(session) = state.sessions.get_active_session(user_id)? else {
        reply(state, user_id, messages::NOT_IN_CHAT).await;
        return Ok(());
    };

    let partner_id = match state.sessions.end(session.id, user_id) {
        Ok(partner_id) => partner_id,
        Err(err) if err.is(ErrorCode::NotParticipant) || err.is(ErrorCode::SessionNotFound) => {
            reply(state, user_id, messages::NOT_IN_CHAT).await;
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    reply(state, user_id, messages::CHAT_ENDED).await;
    deliver(state, partner_id, messages::PARTNER_LEFT).await;
    Ok(())
}

async fn show_interests(state: &AppState, user_id: i64) -> AppResult<()> {
    let catalogue = state.profiles.list_interests()?;
    let selected = state.profiles.get_user_interests(user_id)?;
    let keyboard = messages::interests_keyboard(&catalogue, &selected);
    if let Err(e) = state
        .transport
        .send_keyboard(user_id, &messages::interests_header(&selected), &keyboard)
        .await
    {
        tracing::warn!(user_id, error = %e, "failed to send interests keyboard");
    }
    Ok(())
}

async fn settings(state: &AppState, user_id: i64, args: &str) -> AppResult<()> {
    let Some(user) = state.profiles.get_user(user_id)? else {
        reply(state, user_id, messages::START_FIRST).await;
        return Ok(());
    };
    if args.is_empty() {
        reply(state, user_id, &messages::settings(&user)).await;
        return Ok(());
    }

    let (field, value) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    let value = value.trim();
    let patch = match field.to_lowercase().as_str() {
        "age" => {
            let mut bounds = value.split_whitespace().map(parse_age);
            match (bounds.next().flatten(), bounds.next().flatten(), bounds.next()) {
                (Some(min), Some(max), None) if min <= max => Ok(UserPatch {
                    min_age: Some(min),
                    max_age: Some(max),
                    ..UserPatch::default()
                }),
                _ => Err(messages::INVALID_AGE_RANGE),
            }
        }
        "looking_for" | "looking" => parse_looking_for(value)
            .map(|looking_for| UserPatch {
                looking_for: Some(looking_for),
                ..UserPatch::default()
            })
            .ok_or(WizardStep::LookingFor.hint()),
        "city" => normalize_city(value)
            .map(|city| UserPatch {
                city: Some(city),
                ..UserPatch::default()
            })
            .ok_or(WizardStep::City.hint()),
        "bio" => normalize_bio(value)
            .map(|bio| UserPatch {
                bio: Some(bio),
                ..UserPatch::default()
            })
            .ok_or(WizardStep::Bio.hint()),
        _ => Err(messages::SETTINGS_USAGE),
    };

    match patch {
        Ok(patch) => {
            let updated = state.profiles.upsert_user(user_id, &patch)?;
            tracing::info!(user_id, field, "settings updated");
            let text = format!("{}\n\n{}", messages::SETTINGS_UPDATED, messages::settings(&updated));
            reply(state, user_id, &text).await;
        }
        Err(hint) => reply(state, user_id, hint).await,
    }
    Ok(())
}

// --- Plain text ---

async fn on_text(state: &AppState, user_id: i64, text: &str) -> AppResult<()> {
    if let Some(outcome) = state.wizard.handle_input(user_id, text)? {
        let response = match outcome {
            WizardOutcome::Advanced { next } => messages::wizard_advanced(next),
            WizardOutcome::Rejected(failed) => messages::wizard_rejected(failed.step, failed.hint),
            WizardOutcome::Completed { status } => messages::wizard_completed(&status),
            // Matched while the answer was being stored; the match notice speaks for itself.
            WizardOutcome::Interrupted => return Ok(()),
        };
        reply(state, user_id, &response).await;
        return Ok(());
    }

    let Some(session) = state.sessions.get_active_session(user_id)? else {
        reply(state, user_id, messages::DEFAULT_REPLY).await;
        return Ok(());
    };

    let receipt = match state.sessions.relay(session.id, user_id, text) {
        Ok(receipt) => receipt,
        Err(err) if err.is(ErrorCode::MessageTooLong) => {
            reply(state, user_id, messages::MESSAGE_TOO_LONG).await;
            return Ok(());
        }
        Err(err) if err.is(ErrorCode::NotParticipant) || err.is(ErrorCode::SessionNotActive) => {
            reply(state, user_id, messages::NOT_IN_CHAT).await;
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    if !deliver(state, receipt.partner_id, &messages::relayed(text)).await {
        reply(state, user_id, messages::DELIVERY_FAILED).await;
    }
    Ok(())
}

// --- Callbacks ---

async fn on_callback(state: &AppState, sender: &TgUser, query: CallbackQuery) -> AppResult<()> {
    let user_id = sender.id;
    if let Err(e) = state.transport.answer_callback(&query.id, None).await {
        tracing::debug!(user_id, error = %e, "failed to answer callback");
    }
    let data = query.data.unwrap_or_default();

    if let Some(raw_id) = data.strip_prefix(messages::CALLBACK_TOGGLE_PREFIX) {
        let Ok(interest_id) = raw_id.parse::<i32>() else {
            tracing::debug!(user_id, data = %data, "malformed interest toggle");
            return Ok(());
        };
        if state.profiles.get_user(user_id)?.is_none() {
            reply(state, user_id, messages::START_FIRST).await;
            return Ok(());
        }

        let already = state
            .profiles
            .get_user_interests(user_id)?
            .iter()
            .any(|i| i.id == interest_id);
        let toggled = if already {
            state.profiles.remove_user_interest(user_id, interest_id)
        } else {
            state.profiles.add_user_interest(user_id, interest_id)
        };
        match toggled {
            Ok(_) => tracing::debug!(user_id, interest_id, added = !already, "interest toggled"),
            Err(err) if err.is(ErrorCode::InterestNotFound) => {
                tracing::debug!(user_id, interest_id, "toggle for unknown interest");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        finish_wizard_on_interests(state, user_id).await?;
        return show_interests(state, user_id).await;
    }

    match data.as_str() {
        messages::CALLBACK_DONE => {
            let selected = state.profiles.get_user_interests(user_id)?;
            reply(state, user_id, &messages::interests_done(&selected)).await;
            finish_wizard_on_interests(state, user_id).await
        }
        messages::CALLBACK_CATEGORY => Ok(()),
        other => {
            tracing::debug!(user_id, data = other, "unhandled callback");
            Ok(())
        }
    }
}

async fn finish_wizard_on_interests(state: &AppState, user_id: i64) -> AppResult<()> {
    if state.wizard.interests_changed(user_id)? {
        let status = profile_completion_status(state.profiles.as_ref(), user_id)?;
        reply(state, user_id, &messages::wizard_completed(&status)).await;
    }
    Ok(())
}

// --- Delivery ---

/// Best-effort reply to the user who triggered the update.
async fn reply(state: &AppState, user_id: i64, text: &str) {
    if let Err(e) = state.transport.send_text(user_id, text).await {
        tracing::warn!(user_id, error = %e, "failed to reply");
    }
}

/// Deliver to someone other than the sender. Failures are counted and logged.
async fn deliver(state: &AppState, user_id: i64, text: &str) -> bool {
    match state.transport.send_text(user_id, text).await {
        Ok(()) => true,
        Err(e) => {
            metrics::counter!("chat_delivery_failures_total").increment(1);
            tracing::warn!(user_id, error = %e, "delivery failed");
            false
        }
    }
}
