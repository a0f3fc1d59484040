//! User-facing texts and renderers.

use chatmate_shared::clients::telegram::MAX_TEXT_LENGTH;

use crate::models::{Gender, Interest, InterestCategory, LookingFor, User};
use crate::profile::{ProfileCompletionStatus, WizardStep};
use crate::transport::{button, Keyboard};

pub const WELCOME_NEW: &str = "👋 Welcome to ChatMate!\n\n\
I'll help you find interesting people to chat with anonymously based on shared interests.\n\n\
Let's set up your profile first.";

pub const HELP: &str = "🤖 ChatMate Help\n\n\
Commands:\n\
🔍 /find - Find a chat partner\n\
⏹️ /stop - End current chat\n\
👤 /profile - View your profile\n\
🎯 /interests - Manage your interests\n\
⚙️ /settings - Configure chat preferences\n\
❓ /help - Show this help message\n\n\
How it works:\n\
1. Complete your profile with age, interests, and preferences\n\
2. Use /find to get matched with someone compatible\n\
3. Start chatting anonymously!\n\
4. Use /stop when you want to end the chat\n\n\
Matching factors: shared interests, age preferences, gender preferences, city.\n\n\
Have fun chatting! 💬";

pub const START_FIRST: &str = "Please use /start first to create your profile.";
pub const DEFAULT_REPLY: &str = "Hi! Use /find to start chatting with someone, or /help for more commands.";
pub const UNKNOWN_COMMAND: &str = "I don't know that command. Try /help.";
pub const ALREADY_IN_CHAT: &str = "You're already in a chat! 💬\nUse /stop to end the current chat before finding a new partner.";
pub const SEARCHING: &str = "🔍 Looking for someone interesting to chat with...";
pub const NO_MATCH: &str = "😔 No matches found right now.\n\n\
This could be because:\n\
• No one with similar preferences is online\n\
• Everyone is already in chats\n\
• Your preferences are very specific\n\n\
Try again in a few minutes, or update your preferences in /settings!";
pub const NOT_IN_CHAT: &str = "You're not currently in a chat.";
pub const CHAT_ENDED: &str = "Chat ended! 👋\n\nThanks for using ChatMate. Use /find to start a new chat!";
pub const PARTNER_LEFT: &str = "Your chat partner has left the conversation. 👋\n\nUse /find to start a new chat!";
pub const CHAT_TIMED_OUT: &str = "⌛ This chat has been open for too long and was closed.\n\nUse /find to start a new chat!";
pub const CHAT_CLOSED_BY_ADMIN: &str = "This chat was closed by a moderator.\n\nUse /find to start a new chat!";
pub const DELIVERY_FAILED: &str = "⚠️ Message couldn't be delivered. Your chat partner might have left.";
pub const MESSAGE_TOO_LONG: &str = "⚠️ That message is too long to send.";
pub const UNEXPECTED_ERROR: &str = "❌ An unexpected error occurred. Please try again.";
pub const SETTINGS_UPDATED: &str = "✅ Settings updated!";
pub const SETTINGS_USAGE: &str = "Usage:\n\
/settings age <min> <max>\n\
/settings looking_for <male|female|anyone>\n\
/settings city <name>\n\
/settings bio <text>";
pub const INVALID_AGE_RANGE: &str = "Please give two ages between 13 and 100, the first not above the second.";

pub const CALLBACK_DONE: &str = "interests_done";
pub const CALLBACK_TOGGLE_PREFIX: &str = "toggle_interest_";
pub const CALLBACK_CATEGORY: &str = "category_header";

fn gender_label(gender: Option<Gender>) -> &'static str {
    match gender {
        Some(Gender::Male) => "Male",
        Some(Gender::Female) => "Female",
        Some(Gender::Other) => "Other",
        None => "Not set",
    }
}

fn looking_for_label(looking_for: Option<LookingFor>) -> &'static str {
    match looking_for {
        Some(LookingFor::Male) => "Male",
        Some(LookingFor::Female) => "Female",
        Some(LookingFor::Anyone) => "Anyone",
        None => "Not set",
    }
}

fn joined_names(interests: &[Interest]) -> String {
    if interests.is_empty() {
        return "None".to_string();
    }
    interests.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join(", ")
}

/// Up to five names, then "+N more".
pub fn interest_preview(interests: &[Interest]) -> String {
    const SHOWN: usize = 5;
    let mut text = interests
        .iter()
        .take(SHOWN)
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if interests.len() > SHOWN {
        text.push_str(&format!(" +{} more", interests.len() - SHOWN));
    }
    if text.is_empty() {
        text.push_str("Similar to yours");
    }
    text
}

pub fn wizard_advanced(next: WizardStep) -> String {
    format!("Great! {}", next.prompt())
}

pub fn wizard_rejected(step: WizardStep, hint: &str) -> String {
    format!("{hint}\n\n{}", step.prompt())
}

pub fn wizard_completed(status: &ProfileCompletionStatus) -> String {
    if status.complete {
        "🎉 Profile setup complete!\n\nUse /find to start chatting!".to_string()
    } else {
        "🎉 Profile setup complete!\n\n\
Now let's add some interests so I can find great chat partners for you.\n\n\
Use /interests to add your interests, then /find to start chatting!"
            .to_string()
    }
}

pub fn welcome_back(user: &User) -> String {
    let name = user.first_name.as_deref().unwrap_or("there");
    format!(
        "👋 Welcome back, {name}!\n\n\
Your profile is complete.\n\n\
🔍 /find - find a chat partner\n\
👤 /profile - view your profile\n\
⚙️ /settings - change preferences"
    )
}

pub fn profile_incomplete(status: &ProfileCompletionStatus) -> String {
    format!(
        "Please complete your profile first!\nMissing: {}\n\nUse /start to set up your profile.",
        status.missing.join(", ")
    )
}

pub fn profile(user: &User, interests: &[Interest]) -> String {
    let age = user.age.map_or_else(|| "Not set".to_string(), |a| a.to_string());
    format!(
        "👤 Your Profile\n\n\
Basic Info:\n\
• Age: {age}\n\
• Gender: {}\n\
• City: {}\n\n\
Preferences:\n\
• Looking for: {}\n\
• Age range: {}-{}\n\n\
About:\n{}\n\n\
Interests:\n{}\n\n\
Status: {}\n{}",
        gender_label(user.gender),
        user.city.as_deref().unwrap_or("Not set"),
        looking_for_label(user.looking_for),
        user.min_age,
        user.max_age,
        user.bio.as_deref().unwrap_or("No bio set"),
        joined_names(interests),
        if user.is_active { "🟢 Active" } else { "🔴 Inactive" },
        if user.is_in_chat { "💬 In chat" } else { "💤 Available" },
    )
}

pub fn settings(user: &User) -> String {
    let bio = user.bio.as_deref().unwrap_or("Not set");
    let short: String = bio.chars().take(50).collect();
    let ellipsis = if bio.chars().count() > 50 { "..." } else { "" };
    format!(
        "⚙️ Settings\n\n\
Current Preferences:\n\
• Age range: {}-{}\n\
• Looking for: {}\n\
• City: {}\n\n\
Profile:\n\
• Bio: {short}{ellipsis}\n\n\
{SETTINGS_USAGE}",
        user.min_age,
        user.max_age,
        looking_for_label(user.looking_for),
        user.city.as_deref().unwrap_or("Not set"),
    )
}

/// Notification describing `partner` to the other side of a new session.
pub fn match_found(partner: &User, partner_interests: &[Interest]) -> String {
    let age = partner.age.map_or_else(|| "?".to_string(), |a| a.to_string());
    format!(
        "🎉 Match Found!\n\n\
You've been connected with someone who shares your interests!\n\n\
About your chat partner:\n\
• Age: {age}\n\
• From: {}\n\
• Interests: {}\n\n\
Say hello! The chat is completely anonymous. 💬\n\n\
Use /stop to end the chat anytime.",
        partner.city.as_deref().unwrap_or("Somewhere"),
        interest_preview(partner_interests),
    )
}

const RELAY_PREFIX: &str = "💬 ";

pub fn relayed(text: &str) -> String {
    format!("{RELAY_PREFIX}{text}")
}

/// Longest incoming text, in UTF-16 code units, that still fits one
/// outgoing message once `relayed` has prefixed it.
pub fn relay_capacity() -> usize {
    MAX_TEXT_LENGTH - RELAY_PREFIX.encode_utf16().count()
}

pub fn interests_header(selected: &[Interest]) -> String {
    format!(
        "🎯 Manage Your Interests\n\nCurrent interests: {}\n\nSelect/deselect interests below:",
        joined_names(selected)
    )
}

pub fn interests_done(selected: &[Interest]) -> String {
    format!(
        "✅ Interests updated!\n\nYour interests: {}\n\nUse /find to start chatting with people who share your interests!",
        joined_names(selected)
    )
}

/// Catalogue keyboard grouped by category, two interests per row, ending with "Done".
pub fn interests_keyboard(catalogue: &[Interest], selected: &[Interest]) -> Keyboard {
    let mut rows: Keyboard = Vec::new();
    for category in InterestCategory::ALL {
        let in_category: Vec<&Interest> = catalogue.iter().filter(|i| i.category == category).collect();
        if in_category.is_empty() {
            continue;
        }
        rows.push(vec![button(format!("📁 {category}"), CALLBACK_CATEGORY)]);
        for pair in in_category.chunks(2) {
            rows.push(
                pair.iter()
                    .map(|interest| {
                        let mark = if selected.iter().any(|s| s.id == interest.id) { "✅" } else { "⬜" };
                        button(
                            format!("{mark} {}", interest.name),
                            format!("{CALLBACK_TOGGLE_PREFIX}{}", interest.id),
                        )
                    })
                    .collect(),
            );
        }
    }
    rows.push(vec![button("✅ Done", CALLBACK_DONE)]);
    rows
}
