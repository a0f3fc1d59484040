pub mod manager;
pub mod reaper;

pub use manager::{RelayReceipt, SessionManager};
