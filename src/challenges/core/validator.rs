//! Plausibility filter for oracle answers.
//!
//! Challenge answers are short single words or codes. The checks below only
//! screen out responses that obviously cannot be typed into the form (long
//! prose, refusals, separators only); they say nothing about correctness.

use thiserror::Error;

/// Longest answer, in characters, that is still considered plausible.
pub const MAX_ANSWER_CHARS: usize = 15;

/// Lowercase fragments that reveal the oracle declined to answer.
pub const REFUSAL_MARKERS: [&str; 6] = ["sorry", "can't", "cannot", "unable", "assist", "help"];

const SEPARATORS: [char; 3] = [' ', '-', '_'];

/// Reason an oracle response was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationRejection {
    #[error("response is empty")]
    Empty,
    #[error("response is too long ({0} characters)")]
    TooLong(usize),
    #[error("response contains refusal marker '{0}'")]
    Refusal(&'static str),
    #[error("response contains only separators")]
    OnlySeparators,
}

impl ValidationRejection {
    /// `true` when the oracle declined rather than produced a malformed answer.
    pub fn is_refusal(&self) -> bool {
        matches!(self, ValidationRejection::Refusal(_))
    }
}

/// Apply the validation rules in order and report the first one that fails.
pub fn check_response(text: &str) -> Result<(), ValidationRejection> {
    if text.is_empty() {
        return Err(ValidationRejection::Empty);
    }

    let length = text.chars().count();
    if length > MAX_ANSWER_CHARS {
        return Err(ValidationRejection::TooLong(length));
    }

    let lowered = text.to_lowercase();
    if let Some(marker) = REFUSAL_MARKERS
        .iter()
        .find(|marker| lowered.contains(*marker))
    {
        return Err(ValidationRejection::Refusal(marker));
    }

    if text.chars().all(|c| SEPARATORS.contains(&c)) {
        return Err(ValidationRejection::OnlySeparators);
    }

    Ok(())
}

/// Returns `true` when `text` looks like something worth submitting.
pub fn is_valid_response(text: &str) -> bool {
    check_response(text).is_ok()
}
