//! Vision oracle integrations.
//!
//! These adapters give the challenge solver a single `solve(image, prompt)`
//! surface over third-party image-to-text services. Only one provider is used
//! per run; which one is decided once at startup from [`ProviderKind`].

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// High-level configuration shared by every oracle adapter.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_tokens: 50,
        }
    }
}

/// Identity of the oracle vendor selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Resolution order when several credentials are present.
    pub const PRIORITY: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Anthropic];

    /// Environment variable holding the vendor's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Environment variable overriding the default model.
    pub fn model_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_MODEL",
            ProviderKind::Anthropic => "ANTHROPIC_MODEL",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-5.1-2025-11-13",
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Claude",
        }
    }

    /// Build the concrete adapter for this vendor.
    pub fn build(
        self,
        api_key: impl Into<String>,
        model: impl Into<String>,
        config: OracleConfig,
    ) -> Result<Arc<dyn OracleProvider>, OracleError> {
        let provider: Arc<dyn OracleProvider> = match self {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::with_config(api_key, model, config)?),
            ProviderKind::Anthropic => {
                Arc::new(AnthropicProvider::with_config(api_key, model, config)?)
            }
        };
        Ok(provider)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Common result type returned by oracle providers.
pub type OracleResult = Result<String, OracleError>;

/// Shared interface implemented by oracle vendors.
#[async_trait]
pub trait OracleProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn solve(&self, image: &[u8], prompt: &str) -> OracleResult;
}

/// Errors surfaced by oracle providers.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle provider misconfigured: {0}")]
    Configuration(String),
    #[error("oracle request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("oracle response carried no text")]
    EmptyResponse,
    #[error("oracle error: {0}")]
    Other(String),
}

/// Base64 payload used by both vendors' inline image formats.
pub(crate) fn encode_png(image: &[u8]) -> String {
    STANDARD.encode(image)
}

/// Truncate long bodies before they end up inside error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    if body.chars().count() <= LIMIT {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(LIMIT).collect();
    truncated.push('…');
    truncated
}

pub(crate) fn http_client(config: &OracleConfig) -> Result<reqwest::Client, OracleError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(OracleError::Http)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_is_checked_first() {
        assert_eq!(ProviderKind::PRIORITY[0], ProviderKind::OpenAi);
        assert_eq!(ProviderKind::OpenAi.api_key_var(), "OPENAI_API_KEY");
        assert_eq!(ProviderKind::Anthropic.to_string(), "Claude");
    }

    #[test]
    fn encodes_png_as_standard_base64() {
        assert_eq!(encode_png(&[0x89, 0x50, 0x4e, 0x47]), "iVBORw==");
    }

    #[test]
    fn truncates_long_bodies() {
        let body = "x".repeat(400);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), 301);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_body("short"), "short");
    }
}
