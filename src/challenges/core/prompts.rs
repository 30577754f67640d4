//! Prompt catalogue sent to the vision oracle.
//!
//! The portal's challenge is case-sensitive, so every phrasing insists on
//! preserving letter case and answering with the characters alone.

use super::types::PromptVariant;

pub const ANCIENT_SCRIBE: PromptVariant = PromptVariant::new(
    "ancient_scribe",
    "You are an ancient scribe deciphering weathered manuscripts.\n\
CRITICAL: Preserve the EXACT case - uppercase stays uppercase, lowercase stays lowercase.\n\
Speak only the characters you see, nothing more.",
);

pub const CALLIGRAPHY_MASTER: PromptVariant = PromptVariant::new(
    "calligraphy_master",
    "Master of calligraphy, see through the distortion to the truth beneath.\n\
IMPORTANT: Case matters! Capital letters are taller, lowercase are smaller.\n\
Respond with only the word itself, nothing else.",
);

pub const ORACLE_VISION: PromptVariant = PromptVariant::new(
    "oracle_vision",
    "Oracle of Symbols, what word reveals itself through the noise?\n\
REMEMBER: Uppercase and lowercase are different - preserve exact case.\n\
Whisper only the characters, no explanation.",
);

/// Default rotation order.
pub const DEFAULT_PROMPTS: &[PromptVariant] = &[ANCIENT_SCRIBE, CALLIGRAPHY_MASTER, ORACLE_VISION];

/// Look up a variant of the default catalogue by name.
pub fn prompt_by_name(name: &str) -> Option<PromptVariant> {
    DEFAULT_PROMPTS.iter().copied().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_names_are_unique() {
        let mut names: Vec<_> = DEFAULT_PROMPTS.iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), DEFAULT_PROMPTS.len());
    }

    #[test]
    fn every_prompt_mentions_case() {
        for prompt in DEFAULT_PROMPTS {
            assert!(prompt.text.to_lowercase().contains("case"), "{}", prompt.name);
        }
        assert_eq!(prompt_by_name("oracle_vision"), Some(ORACLE_VISION));
        assert_eq!(prompt_by_name("pattern_poet"), None);
    }
}
