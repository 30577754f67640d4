//! Core data structures shared across the solver, the retrieval state machine
//! and the result extractor.

use std::fmt;

use bytes::Bytes;

/// Raw PNG bytes captured from the lookup form during one attempt.
///
/// Each image belongs to exactly one `(identifier, attempt)` pair and is never
/// mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeImage {
    pub identifier: String,
    pub attempt: usize,
    pub bytes: Bytes,
}

impl ChallengeImage {
    pub fn new(identifier: impl Into<String>, attempt: usize, bytes: impl Into<Bytes>) -> Self {
        Self {
            identifier: identifier.into(),
            attempt,
            bytes: bytes.into(),
        }
    }

    /// Artifact file name, e.g. `ABC010101AAA_attempt2.png`.
    pub fn file_name(&self) -> String {
        format!("{}_attempt{}.png", self.identifier, self.attempt)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Named phrasing sent to the oracle alongside the challenge image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptVariant {
    pub name: &'static str,
    pub text: &'static str,
}

impl PromptVariant {
    pub const fn new(name: &'static str, text: &'static str) -> Self {
        Self { name, text }
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
