pub mod completion;
pub mod wizard;

pub use completion::{profile_completion_status, ProfileCompletionStatus};
pub use wizard::{ProfileWizard, ValidationFailed, WizardOutcome, WizardStep};
