//! Recall.ai meeting bots: client, recording toggle and status webhook.
//!
//! Modules:
//! - recording: enable/disable a bot for one meeting
//! - webhook: bot status callbacks, transcript fetch and meeting analysis

pub mod recording;
pub mod webhook;

use serde::{Deserialize, Serialize};

use crate::config::RecallConfig;
use crate::db::DbError;

pub use recording::set_meeting_recording;
pub use webhook::{handle_webhook, RecallEvent, WebhookOutcome};

#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Recall API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database: {0}")]
    Db(#[from] DbError),
    #[error("Recall is not configured")]
    NotConfigured,
    #[error("Meeting not found: {0}")]
    MeetingNotFound(String),
    #[error("Meeting {0} has no meeting URL")]
    NoMeetingUrl(String),
    #[error("Meeting {0} already has an active bot")]
    BotAlreadyActive(String),
    #[error("Invalid webhook token")]
    InvalidToken,
    #[error("Unrecognised webhook payload")]
    InvalidPayload,
}

impl RecallError {
    /// Failures on the Recall side rather than in the request.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. } | Self::Json(_))
    }
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateBotRequest<'a> {
    meeting_url: &'a str,
    bot_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    join_at: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptSegment {
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    words: Vec<TranscriptWord>,
}

#[derive(Debug, Deserialize)]
struct TranscriptWord {
    #[serde(default)]
    text: String,
}

/// Recall.ai bot API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RecallClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RecallClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// A client when an API key is configured.
    pub fn from_config(config: &RecallConfig, http: reqwest::Client) -> Option<Self> {
        let key = config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(Self::new(http, &config.api_base_url, key))
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Token {}", self.api_key),
        )
    }

    /// Schedule a bot for a meeting. Returns the bot id.
    pub async fn create_bot(
        &self,
        meeting_url: &str,
        join_at: Option<&str>,
        bot_name: &str,
        webhook_url: Option<&str>,
    ) -> Result<String, RecallError> {
        let body = CreateBotRequest {
            meeting_url,
            bot_name,
            join_at,
            webhook_url,
        };
        let resp = self
            .auth(self.http.post(format!("{}/bot/", self.base_url)))
            .json(&body)
            .send()
            .await?;
        let bot: BotResponse = check_response(resp).await?.json().await?;
        log::info!("Recall bot {} created for {}", bot.id, meeting_url);
        Ok(bot.id)
    }

    /// Remove a scheduled bot. A bot the provider no longer knows counts as
    /// removed.
    pub async fn delete_bot(&self, bot_id: &str) -> Result<(), RecallError> {
        let resp = self
            .auth(self.http.delete(format!("{}/bot/{}/", self.base_url, bot_id)))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            log::info!("Recall bot {} already gone", bot_id);
            return Ok(());
        }
        check_response(resp).await?;
        Ok(())
    }

    /// Transcript as `"Speaker: words"` lines.
    pub async fn fetch_transcript(&self, bot_id: &str) -> Result<String, RecallError> {
        let resp = self
            .auth(
                self.http
                    .get(format!("{}/bot/{}/transcript/", self.base_url, bot_id)),
            )
            .send()
            .await?;
        let segments: Vec<TranscriptSegment> = check_response(resp).await?.json().await?;

        let mut transcript = String::new();
        for segment in segments {
            let text = segment
                .words
                .iter()
                .map(|w| w.text.trim())
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                continue;
            }
            if !transcript.is_empty() {
                transcript.push('\n');
            }
            transcript.push_str(segment.speaker.as_deref().unwrap_or("Unknown"));
            transcript.push_str(": ");
            transcript.push_str(&text);
        }
        Ok(transcript)
    }
}

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, RecallError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(RecallError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client() -> (MockServer, RecallClient) {
        let server = MockServer::start().await;
        let client = RecallClient::new(reqwest::Client::new(), &server.uri(), "rk_test");
        (server, client)
    }

    #[tokio::test]
    async fn test_create_bot_sends_meeting_and_auth() {
        let (server, client) = client().await;
        Mock::given(method("POST"))
            .and(path("/bot/"))
            .and(header("authorization", "Token rk_test"))
            .and(body_partial_json(serde_json::json!({
                "meeting_url": "https://meet.google.com/abc-defg-hij",
                "bot_name": "Notetaker",
                "join_at": "2026-03-01T15:00:00+00:00"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "bot-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client
            .create_bot(
                "https://meet.google.com/abc-defg-hij",
                Some("2026-03-01T15:00:00+00:00"),
                "Notetaker",
                None,
            )
            .await
            .unwrap();
        assert_eq!(id, "bot-1");
    }

    #[tokio::test]
    async fn test_delete_missing_bot_is_ok() {
        let (server, client) = client().await;
        Mock::given(method("DELETE"))
            .and(path("/bot/bot-gone/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        client.delete_bot("bot-gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_failure_is_upstream_error() {
        let (server, client) = client().await;
        Mock::given(method("DELETE"))
            .and(path("/bot/bot-1/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let err = client.delete_bot("bot-1").await.unwrap_err();
        assert!(err.is_upstream());
        assert!(matches!(err, RecallError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_transcript_joins_words() {
        let (server, client) = client().await;
        Mock::given(method("GET"))
            .and(path("/bot/bot-1/transcript/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"speaker": "Hank", "words": [{"text": "Exports"}, {"text": "are"}, {"text": "slow."}]},
                {"speaker": null, "words": [{"text": "Noted."}]},
                {"speaker": "Casey", "words": []}
            ])))
            .mount(&server)
            .await;

        let transcript = client.fetch_transcript("bot-1").await.unwrap();
        assert_eq!(transcript, "Hank: Exports are slow.\nUnknown: Noted.");
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = RecallConfig::default();
        assert!(RecallClient::from_config(&config, reqwest::Client::new()).is_none());
        config.api_key = Some("rk_live".into());
        assert!(RecallClient::from_config(&config, reqwest::Client::new()).is_some());
    }
}
