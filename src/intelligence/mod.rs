//! LLM-backed analysis: provider abstraction, response schema, prompts.
//!
//! Modules:
//! - gemini: Google `generateContent` provider
//! - openai: chat-completions provider
//! - prompts: prompt builders for thread, incremental, meeting and email modes

pub mod gemini;
pub mod openai;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::{IntelligenceConfig, LlmProviderKind};

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("No API key configured for provider {provider}")]
    NotConfigured { provider: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A text-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    /// Complete a prompt, asking the model for a single JSON object.
    async fn complete_json(&self, prompt: &str) -> Result<String, LlmError>;

    /// Complete a prompt as free text.
    async fn complete_text(&self, prompt: &str) -> Result<String, LlmError>;
}

pub type SharedLlm = Arc<dyn LlmProvider>;

/// Build the configured provider.
pub fn build_provider(
    config: &IntelligenceConfig,
    http: reqwest::Client,
) -> Result<SharedLlm, LlmError> {
    match config.provider {
        LlmProviderKind::Gemini => {
            let key = config
                .gemini_api_key
                .clone()
                .ok_or_else(|| LlmError::NotConfigured {
                    provider: "gemini".to_string(),
                })?;
            Ok(Arc::new(gemini::GeminiProvider::new(
                http,
                key,
                config.gemini_model.clone(),
                config.temperature,
            )))
        }
        LlmProviderKind::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| LlmError::NotConfigured {
                    provider: "openai".to_string(),
                })?;
            Ok(Arc::new(openai::OpenAiProvider::new(
                http,
                key,
                config.openai_model.clone(),
                config.temperature,
            )))
        }
    }
}

/// Map a non-success provider response onto `LlmError`.
pub(crate) async fn check_llm_response(
    provider: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    match status.as_u16() {
        401 | 403 => Err(LlmError::AuthFailed {
            provider: provider.to_string(),
        }),
        429 => Err(LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        }),
        code => {
            let body = resp.text().await.unwrap_or_default();
            Err(LlmError::RequestFailed {
                provider: provider.to_string(),
                reason: format!("HTTP {}: {}", code, body.chars().take(500).collect::<String>()),
            })
        }
    }
}

// =============================================================================
// Analysis schema
// =============================================================================

/// Structured analysis of a thread or meeting, as returned by the model.
///
/// Every field defaults so a partial answer still yields something usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadAnalysis {
    #[serde(default)]
    pub problem_statement: Option<String>,
    #[serde(default)]
    pub key_participants: Vec<String>,
    #[serde(default)]
    pub timeline_summary: Option<String>,
    #[serde(default)]
    pub resolution_status: Option<String>,
    #[serde(default)]
    pub customer_sentiment: Option<String>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub sentiment_score: Option<i64>,
    #[serde(default)]
    pub next_steps: Vec<AnalyzedNextStep>,
    #[serde(default)]
    pub feature_requests: Vec<AnalyzedFeatureRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedNextStep {
    #[serde(default, alias = "description")]
    pub text: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedFeatureRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub customer_description: Option<String>,
    #[serde(default)]
    pub use_case: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub urgency_signals: Option<String>,
    #[serde(default)]
    pub customer_impact: Option<String>,
}

impl ThreadAnalysis {
    /// The text stored as the row summary: timeline first, problem statement
    /// as the fallback.
    pub fn summary(&self) -> Option<String> {
        non_blank(self.timeline_summary.as_deref())
            .or_else(|| non_blank(self.problem_statement.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Accept `1`, `1.0`, `"1"` or null, clamped to [-2, 2].
fn lenient_score<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let score = match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    };
    Ok(score.map(|s| s.clamp(-2, 2)))
}

/// Parse a model answer into `ThreadAnalysis`, tolerating code fences and
/// surrounding prose.
pub fn parse_analysis(provider: &str, response: &str) -> Result<ThreadAnalysis, LlmError> {
    let json = extract_json_object(response).ok_or_else(|| LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: "no JSON object in response".to_string(),
    })?;
    serde_json::from_str(json).map_err(|e| LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: e.to_string(),
    })
}

/// Extract a JSON object from the response text.
/// Handles markdown fences and leading or trailing text.
pub(crate) fn extract_json_object(response: &str) -> Option<&str> {
    if let Some(start) = response.find("```") {
        let after_fence = start + 3;
        if let Some(nl) = response[after_fence..].find('\n') {
            let body_start = after_fence + nl + 1;
            if let Some(end) = response[body_start..].find("```") {
                let candidate = response[body_start..body_start + end].trim();
                if candidate.starts_with('{') {
                    return Some(candidate);
                }
            }
        }
    }

    let trimmed = response.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    let start = response.find('{')?;
    let candidate = &response[start..];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in candidate.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if ch == '{' {
            depth += 1;
        } else if ch == '}' {
            depth -= 1;
            if depth == 0 {
                return Some(&candidate[..=i]);
            }
        }
    }
    None
}

// =============================================================================
// Test double
// =============================================================================
