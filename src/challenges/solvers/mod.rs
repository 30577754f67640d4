//! Challenge solver.
//!
//! Sends the captured challenge image to the configured oracle provider with
//! one prompt variant at a time, rotating through the catalogue until a
//! response passes the validator. The rotation position lives in a
//! [`RotationCursor`] owned by the caller, so consecutive challenges start
//! with the variant after the last one that worked.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::challenges::core::{DEFAULT_PROMPTS, PromptVariant, ValidationRejection, check_response};
use crate::external_deps::captcha::{OracleError, OracleProvider};

/// Characters of a rejected response echoed into the log.
const LOGGED_RESPONSE_CHARS: usize = 30;

/// Position of the next prompt variant to try. Always kept within the
/// catalogue length by the solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCursor {
    position: usize,
}

impl RotationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor at `position` within a catalogue of `len` variants, wrapped
    /// into `[0, len)`. An empty catalogue pins it at 0.
    pub fn starting_at(position: usize, len: usize) -> Self {
        Self {
            position: position.checked_rem(len).unwrap_or(0),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn start(&self, len: usize) -> usize {
        self.position % len
    }

    fn advance_past(&mut self, index: usize, len: usize) {
        self.position = (index + 1) % len;
    }
}

/// Validated answer together with the variant that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvedChallenge {
    pub answer: String,
    pub prompt: PromptVariant,
    /// Number of oracle calls spent, including the successful one.
    pub calls: usize,
}

/// Why one variant did not yield an answer.
#[derive(Debug, Error)]
pub enum AttemptRejection {
    #[error("invalid response: {0}")]
    Invalid(#[from] ValidationRejection),
    #[error(transparent)]
    Provider(#[from] OracleError),
}

impl AttemptRejection {
    pub fn is_refusal(&self) -> bool {
        matches!(self, AttemptRejection::Invalid(rejection) if rejection.is_refusal())
    }
}

/// A rejected variant, kept for diagnostics.
#[derive(Debug)]
pub struct PromptRejection {
    pub prompt: &'static str,
    pub reason: AttemptRejection,
}

impl fmt::Display for PromptRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.prompt, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("all prompts failed")]
    AllPromptsFailed { rejections: Vec<PromptRejection> },
}

/// Drives one oracle provider through the prompt catalogue.
pub struct ChallengeSolver {
    provider: Arc<dyn OracleProvider>,
    label: &'static str,
    prompts: Vec<PromptVariant>,
}

impl ChallengeSolver {
    /// Solver using the default catalogue.
    pub fn new(provider: Arc<dyn OracleProvider>) -> Self {
        Self {
            label: provider.name(),
            provider,
            prompts: DEFAULT_PROMPTS.to_vec(),
        }
    }

    /// Name shown in progress lines, e.g. `OpenAI`.
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Replace the prompt catalogue.
    pub fn with_prompts(mut self, prompts: impl IntoIterator<Item = PromptVariant>) -> Self {
        self.prompts = prompts.into_iter().collect();
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn prompts(&self) -> &[PromptVariant] {
        &self.prompts
    }

    /// Try each variant once, in rotation order from `cursor`.
    ///
    /// On success the cursor moves to the variant after the winning one; on
    /// exhaustion it moves one step past where this call started.
    pub async fn solve(
        &self,
        image: &[u8],
        cursor: &mut RotationCursor,
    ) -> Result<SolvedChallenge, SolveError> {
        let len = self.prompts.len();
        if len == 0 {
            return Err(SolveError::AllPromptsFailed {
                rejections: Vec::new(),
            });
        }

        let start = cursor.start(len);
        let mut rejections = Vec::with_capacity(len);

        for offset in 0..len {
            let index = (start + offset) % len;
            let prompt = self.prompts[index];
            log::info!("  Using {} with '{}' prompt...", self.label, prompt.name);

            match self.ask(image, prompt).await {
                Ok(answer) => {
                    cursor.advance_past(index, len);
                    return Ok(SolvedChallenge {
                        answer,
                        prompt,
                        calls: offset + 1,
                    });
                }
                Err(reason) => rejections.push(PromptRejection {
                    prompt: prompt.name,
                    reason,
                }),
            }
        }

        cursor.advance_past(start, len);
        Err(SolveError::AllPromptsFailed { rejections })
    }

    async fn ask(&self, image: &[u8], prompt: PromptVariant) -> Result<String, AttemptRejection> {
        let response = match self.provider.solve(image, prompt.text).await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("    Error: {err}, trying next...");
                return Err(err.into());
            }
        };

        let answer = response.trim();
        if let Err(rejection) = check_response(answer) {
            let shown: String = answer.chars().take(LOGGED_RESPONSE_CHARS).collect();
            log::warn!("    Invalid response: '{shown}...', trying next...");
            return Err(rejection.into());
        }
        Ok(answer.to_string())
    }
}
