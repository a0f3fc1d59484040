pub mod algorithm;
pub mod selector;

pub use selector::{MatchCandidate, Matcher};
