//! Google API client: OAuth token refresh, Gmail v1 and Calendar v3.
//!
//! Tokens are stored per user in `provider_tokens` (see `token_store`).
//! HTTP goes straight through reqwest; base URLs are injectable so the
//! clients can run against a mock server.
//!
//! Modules:
//! - calendar: event and calendar-list fetching
//! - gmail: thread listing and full-message decoding
//! - token_store: `GoogleToken` <-> `provider_tokens` rows

pub mod calendar;
pub mod gmail;
pub mod token_store;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::db::{DbError, SharedDb};

/// Scopes the dashboard needs for sync.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/calendar.readonly",
];

pub const PROVIDER: &str = "google";

const DEFAULT_GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const DEFAULT_CALENDAR_BASE: &str = "https://www.googleapis.com/calendar/v3";

// ============================================================================
// Token types
// ============================================================================

/// OAuth2 credentials for one user's Google account.
///
/// Both `accessToken` and `token` are accepted on read so tokens exported by
/// the Google client libraries can be pasted in as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleToken {
    #[serde(alias = "token", alias = "access_token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri", alias = "token_uri")]
    pub token_uri: String,
    #[serde(alias = "client_id")]
    pub client_id: String,
    #[serde(default, alias = "client_secret")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Token expiry time (RFC 3339)
    #[serde(default)]
    pub expiry: Option<String>,
    /// Authenticated mailbox address
    #[serde(default, alias = "email")]
    pub account: Option<String>,
}

pub(crate) fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("No Google token stored for user {0}")]
    TokenNotFound(String),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database: {0}")]
    Db(#[from] DbError),
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retryable,
    NonRetryable,
}

fn retry_decision_for_status(status: reqwest::StatusCode) -> RetryDecision {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying 429/408/5xx responses and connect/timeout errors.
///
/// Requests with streaming bodies cannot be cloned and are sent once.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, GoogleApiError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(GoogleApiError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                let decision = retry_decision_for_status(status);
                if decision == RetryDecision::Retryable && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "google_api retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "google_api retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(GoogleApiError::Http(err));
            }
        }
    }

    Err(GoogleApiError::ApiError {
        status: 0,
        message: "request exhausted retries".to_string(),
    })
}

/// Map a non-success response onto `GoogleApiError`.
pub(crate) async fn check_response(
    resp: reqwest::Response,
) -> Result<reqwest::Response, GoogleApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

// ============================================================================
// Client
// ============================================================================

/// Gmail + Calendar client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    gmail_base: String,
    calendar_base: String,
    retry: RetryPolicy,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_urls(http, DEFAULT_GMAIL_BASE, DEFAULT_CALENDAR_BASE)
    }

    /// Point the client at alternative API roots (mock servers in tests).
    pub fn with_base_urls(http: reqwest::Client, gmail_base: &str, calendar_base: &str) -> Self {
        Self {
            http,
            gmail_base: gmail_base.trim_end_matches('/').to_string(),
            calendar_base: calendar_base.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

// ============================================================================
// Token refresh
// ============================================================================

/// Global mutex to serialize concurrent token refreshes.
static TOKEN_REFRESH_MUTEX: std::sync::OnceLock<Mutex<()>> = std::sync::OnceLock::new();

fn refresh_mutex() -> &'static Mutex<()> {
    TOKEN_REFRESH_MUTEX.get_or_init(|| Mutex::new(()))
}

/// Check if a token is expired based on its expiry field.
pub fn is_token_expired(token: &GoogleToken) -> bool {
    match &token.expiry {
        None => true,
        Some(expiry_str) => {
            match chrono::DateTime::parse_from_rfc3339(&expiry_str.replace('Z', "+00:00"))
                .or_else(|_| chrono::DateTime::parse_from_rfc3339(expiry_str))
            {
                Ok(expiry) => {
                    // Expired if within 60 seconds of expiry
                    let now = chrono::Utc::now();
                    expiry <= now + chrono::Duration::seconds(60)
                }
                Err(_) => true,
            }
        }
    }
}

/// Exchange the refresh token for a new access token.
///
/// `fallback_secret` is sent on a second attempt when the token endpoint
/// answers `invalid_client` and the token carries no secret of its own.
/// Does not persist; see [`get_valid_access_token`].
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token: &GoogleToken,
    fallback_secret: Option<&str>,
) -> Result<GoogleToken, GoogleApiError> {
    let refresh_token = token
        .refresh_token
        .as_ref()
        .ok_or(GoogleApiError::AuthExpired)?;
    let secret = token.client_secret.as_deref().or(fallback_secret);

    let (status, body_text) =
        refresh_access_token_request(http, token, refresh_token, None).await?;
    let body: serde_json::Value = if status.is_success() {
        serde_json::from_str(&body_text)?
    } else if status.as_u16() == 400 && body_text.contains("invalid_client") && secret.is_some() {
        let (retry_status, retry_body_text) =
            refresh_access_token_request(http, token, refresh_token, secret).await?;
        if !retry_status.is_success() {
            return Err(map_refresh_error(retry_status.as_u16(), &retry_body_text));
        }
        serde_json::from_str(&retry_body_text)?
    } else {
        return Err(map_refresh_error(status.as_u16(), &body_text));
    };

    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| GoogleApiError::RefreshFailed("No access_token in response".into()))?;

    let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
    let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

    let mut new_token = token.clone();
    new_token.access_token = access_token.to_string();
    new_token.expiry = Some(expiry.to_rfc3339());
    // Google rotates refresh tokens only occasionally
    if let Some(rotated) = body["refresh_token"].as_str() {
        new_token.refresh_token = Some(rotated.to_string());
    }
    Ok(new_token)
}

async fn refresh_access_token_request(
    http: &reqwest::Client,
    token: &GoogleToken,
    refresh_token: &str,
    client_secret: Option<&str>,
) -> Result<(reqwest::StatusCode, String), GoogleApiError> {
    let mut form = vec![
        ("client_id", token.client_id.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    if let Some(secret) = client_secret {
        form.push(("client_secret", secret));
    }
    let resp = http.post(&token.token_uri).form(&form).send().await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Ok((status, body))
}

fn map_refresh_error(status: u16, body: &str) -> GoogleApiError {
    let lowered = body.to_lowercase();
    if (status == 400 || status == 401)
        && (lowered.contains("invalid_grant") || lowered.contains("token has been expired"))
    {
        return GoogleApiError::AuthExpired;
    }
    GoogleApiError::RefreshFailed(format!("HTTP {}: {}", status, body))
}

/// Return a usable access token for `user_id`, refreshing and persisting
/// it when the stored one is expired.
///
/// Refreshes are serialized; a caller that waited on another refresh
/// re-reads the store and reuses the fresh token instead of refreshing again.
pub async fn get_valid_access_token(
    db: &SharedDb,
    http: &reqwest::Client,
    user_id: &str,
    fallback_secret: Option<&str>,
) -> Result<String, GoogleApiError> {
    let token = token_store::load_token(&db.lock(), user_id)?;
    if !is_token_expired(&token) {
        return Ok(token.access_token);
    }

    let _guard = refresh_mutex().lock().await;
    let token = token_store::load_token(&db.lock(), user_id)?;
    if !is_token_expired(&token) {
        return Ok(token.access_token);
    }

    log::info!("Refreshing Google access token for user {}", user_id);
    let refreshed = refresh_access_token(http, &token, fallback_secret).await?;
    token_store::save_token(&db.lock(), user_id, &refreshed)?;
    Ok(refreshed.access_token)
}

// ============================================================================
// Tests
// ============================================================================
