use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{
    OracleConfig, OracleError, OracleProvider, OracleResult, encode_png, http_client,
    truncate_body,
};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic Messages API with a base64 image block.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    endpoint: Url,
    config: OracleConfig,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, OracleError> {
        Self::with_config(api_key, model, OracleConfig::default())
    }

    pub fn with_config(
        api_key: impl Into<String>,
        model: impl Into<String>,
        config: OracleConfig,
    ) -> Result<Self, OracleError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(OracleError::Configuration("empty Anthropic API key".into()));
        }
        let endpoint = Url::parse(DEFAULT_ENDPOINT)
            .map_err(|err| OracleError::Configuration(err.to_string()))?;

        Ok(Self {
            client: http_client(&config)?,
            api_key,
            model: model.into(),
            endpoint,
            config,
        })
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, image: &[u8], prompt: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": encode_png(image),
                        }
                    },
                    { "type": "text", "text": prompt }
                ]
            }],
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

fn parse_message(body: &str) -> OracleResult {
    let message: MessageResponse = serde_json::from_str(body)?;
    message
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .find_map(|block| block.text)
        .map(|text| text.trim().to_string())
        .ok_or(OracleError::EmptyResponse)
}

#[async_trait]
impl OracleProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn solve(&self, image: &[u8], prompt: &str) -> OracleResult {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(image, prompt))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        parse_message(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_block_precedes_prompt() {
        let provider = AnthropicProvider::new("key", "claude-test").unwrap();
        let body = provider.request_body(&[1, 2, 3], "read it");
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["data"], "AQID");
        assert_eq!(content[1]["text"], "read it");
        assert_eq!(body["max_tokens"], 50);
    }

    #[test]
    fn parses_first_text_block() {
        let body = r#"{"content":[{"type":"text","text":" Qw3rT "}],"stop_reason":"end_turn"}"#;
        assert_eq!(parse_message(body).unwrap(), "Qw3rT");
    }

    #[test]
    fn message_without_text_is_an_error() {
        let err = parse_message(r#"{"content":[]}"#).unwrap_err();
        assert!(matches!(err, OracleError::EmptyResponse));
        assert!(matches!(
            parse_message("not json").unwrap_err(),
            OracleError::Decode(_)
        ));
    }
}
