use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{
    OracleConfig, OracleError, OracleProvider, OracleResult, encode_png, http_client,
    truncate_body,
};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Adapter for OpenAI chat completions with inline image input.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    endpoint: Url,
    config: OracleConfig,
}

impl OpenAiProvider {
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
            return Err(OracleError::Configuration("empty OpenAI API key".into()));
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

    /// Point the adapter at a compatible endpoint (proxies, gateways).
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
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{}", encode_png(image)) }
                    }
                ]
            }],
            "max_completion_tokens": self.config.max_tokens,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn parse_completion(body: &str) -> OracleResult {
    let completion: ChatCompletion = serde_json::from_str(body)?;
    completion
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or(OracleError::EmptyResponse)
}

#[async_trait]
impl OracleProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn solve(&self, image: &[u8], prompt: &str) -> OracleResult {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
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

        parse_completion(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_embeds_prompt_and_data_url() {
        let provider = OpenAiProvider::new("sk-test", "gpt-test").unwrap();
        let body = provider.request_body(&[1, 2, 3], "read it");
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["max_completion_tokens"], 50);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["text"], "read it");
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );
    }

    #[test]
    fn parses_first_choice_and_trims() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  xY7kP \n"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "xY7kP");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, OracleError::EmptyResponse));
    }

    #[test]
    fn rejects_blank_key() {
        let err = OpenAiProvider::new("  ", "gpt-test").unwrap_err();
        assert!(matches!(err, OracleError::Configuration(_)));
    }
}
