//! Core utilities shared by the classifier, the solver and the retrieval
//! state machine.

pub mod prompts;
pub mod timing;
pub mod types;
pub mod validator;

pub use prompts::{DEFAULT_PROMPTS, prompt_by_name};
pub use timing::{PauseKind, PauseSchedule};
pub use types::{ChallengeImage, PromptVariant};
pub use validator::{ValidationRejection, check_response, is_valid_response};
