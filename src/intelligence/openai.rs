//! OpenAI chat-completions provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{check_llm_response, LlmError, LlmProvider};

const DEFAULT_BASE: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "openai";

pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client, api_key: String, model: String, temperature: f32) -> Self {
        Self::with_base_url(http, DEFAULT_BASE, api_key, model, temperature)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        base_url: &str,
        api_key: String,
        model: String,
        temperature: f32,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature,
        }
    }

    async fn chat(&self, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp = check_llm_response(PROVIDER, resp).await?;
        let parsed: ChatResponse = resp.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "empty response".to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete_json(&self, prompt: &str) -> Result<String, LlmError> {
        self.chat(prompt, true).await
    }

    async fn complete_text(&self, prompt: &str) -> Result<String, LlmError> {
        self.chat(prompt, false).await
    }
}
