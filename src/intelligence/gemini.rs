//! Gemini `generateContent` provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{check_llm_response, LlmError, LlmProvider};

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "gemini";

pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiProvider {
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

    async fn generate(&self, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let mut generation_config = json!({ "temperature": self.temperature });
        if json_mode {
            generation_config["responseMimeType"] = json!("application/json");
        }
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp = check_llm_response(PROVIDER, resp).await?;
        let parsed: GenerateResponse = resp.json().await?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "empty response".to_string(),
            });
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete_json(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate(prompt, true).await
    }

    async fn complete_text(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate(prompt, false).await
    }
}
