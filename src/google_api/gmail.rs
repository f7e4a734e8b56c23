//! Gmail API v1: list thread ids and fetch whole threads.
//!
//! Threads are fetched with `format=full`; each message keeps its From/To/Cc
//! headers, subject, both text bodies and the server-side `internalDate`.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::{check_response, send_with_retry, GoogleApiError, GoogleClient};

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadListResponse {
    #[serde(default)]
    threads: Vec<ThreadStub>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    messages: Vec<MessageDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    /// Milliseconds since the epoch, as a string.
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<FullPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullPayload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<FullPayload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

// ============================================================================
// Public types
// ============================================================================

#[derive(Debug, Clone)]
pub struct GmailThread {
    pub id: String,
    pub snippet: String,
    pub messages: Vec<GmailMessage>,
}

impl GmailThread {
    /// Subject of the first message that has one.
    pub fn subject(&self) -> Option<String> {
        self.messages.iter().find_map(|m| m.subject.clone())
    }

    /// Latest message date in the thread (RFC 3339).
    pub fn last_message_date(&self) -> Option<String> {
        self.messages
            .iter()
            .filter_map(|m| m.date.as_deref())
            .filter_map(|d| DateTime::parse_from_rfc3339(d).ok())
            .max()
            .map(|d| d.with_timezone(&Utc).to_rfc3339())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GmailMessage {
    pub id: String,
    pub thread_id: String,
    /// Raw From header, e.g. `Jane Doe <jane@acme.io>`.
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: Option<String>,
    pub snippet: String,
    /// RFC 3339, from `internalDate` or the Date header.
    pub date: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

// ============================================================================
// Gmail API
// ============================================================================

impl GoogleClient {
    /// List thread ids matching a Gmail search query, newest first, up to `max`.
    pub async fn list_thread_ids(
        &self,
        access_token: &str,
        query: &str,
        max: usize,
    ) -> Result<Vec<String>, GoogleApiError> {
        let url = format!("{}/users/me/threads", self.gmail_base);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < max {
            let page_size = (max - ids.len()).min(100).to_string();
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("q", query), ("maxResults", page_size.as_str())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let resp = check_response(send_with_retry(request, &self.retry).await?).await?;
            let list: ThreadListResponse = resp.json().await?;
            ids.extend(list.threads.into_iter().map(|t| t.id));

            page_token = list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        ids.truncate(max);
        Ok(ids)
    }

    /// Fetch a thread with every message decoded.
    pub async fn fetch_thread(
        &self,
        access_token: &str,
        thread_id: &str,
    ) -> Result<GmailThread, GoogleApiError> {
        let url = format!("{}/users/me/threads/{}", self.gmail_base, thread_id);
        let resp = check_response(
            send_with_retry(
                self.http
                    .get(&url)
                    .bearer_auth(access_token)
                    .query(&[("format", "full")]),
                &self.retry,
            )
            .await?,
        )
        .await?;
        let detail: ThreadDetail = resp.json().await?;
        Ok(convert_thread(detail))
    }
}

fn convert_thread(detail: ThreadDetail) -> GmailThread {
    let thread_id = detail.id;
    let messages = detail
        .messages
        .into_iter()
        .map(|m| convert_message(m, &thread_id))
        .collect();
    GmailThread {
        id: thread_id,
        snippet: detail.snippet,
        messages,
    }
}

fn convert_message(detail: MessageDetail, thread_id: &str) -> GmailMessage {
    let payload = detail.payload;
    let headers = payload.as_ref().map(|p| &p.headers[..]).unwrap_or(&[]);
    let get_header = |name: &str| -> Option<String> {
        headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let date = detail
        .internal_date
        .as_deref()
        .and_then(parse_internal_date)
        .or_else(|| get_header("Date").as_deref().and_then(parse_date_header));

    GmailMessage {
        id: detail.id,
        thread_id: if detail.thread_id.is_empty() {
            thread_id.to_string()
        } else {
            detail.thread_id
        },
        from: get_header("From"),
        to: get_header("To").map(|v| split_address_list(&v)).unwrap_or_default(),
        cc: get_header("Cc").map(|v| split_address_list(&v)).unwrap_or_default(),
        subject: get_header("Subject"),
        snippet: detail.snippet,
        date,
        body_text: payload.as_ref().and_then(|p| extract_body(p, "text/plain")),
        body_html: payload.as_ref().and_then(|p| extract_body(p, "text/html")),
    }
}

fn parse_internal_date(ms: &str) -> Option<String> {
    let ms: i64 = ms.parse().ok()?;
    Utc.timestamp_millis_opt(ms).single().map(|d| d.to_rfc3339())
}

fn parse_date_header(value: &str) -> Option<String> {
    // Strip trailing comments like "(UTC)" that RFC 2822 parsers reject
    let cleaned = value.split(" (").next().unwrap_or(value);
    DateTime::parse_from_rfc2822(cleaned)
        .ok()
        .map(|d| d.with_timezone(&Utc).to_rfc3339())
}

/// Split a To/Cc header on commas that are not inside a quoted display name.
pub fn split_address_list(header: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in header.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    parts
}

/// Recursively walk MIME parts to find body data matching the target MIME type.
fn extract_body(payload: &FullPayload, target_mime: &str) -> Option<String> {
    if payload.mime_type == target_mime {
        if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
            return decode_url_safe_base64(data);
        }
    }
    for part in &payload.parts {
        if let Some(text) = extract_body(part, target_mime) {
            return Some(text);
        }
    }
    None
}

/// Decode URL-safe base64 as used by the Gmail API. Padding is optional.
fn decode_url_safe_base64(data: &str) -> Option<String> {
    use base64::Engine;
    let trimmed = data.trim_end_matches('=');
    match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(trimmed) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(_) => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn b64(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(text)
    }

    fn thread_json() -> serde_json::Value {
        serde_json::json!({
            "id": "t-100",
            "snippet": "Thanks, see you Tuesday",
            "messages": [{
                "id": "m-1",
                "threadId": "t-100",
                "snippet": "Can we talk renewal?",
                "internalDate": "1767225600000",
                "payload": {
                    "mimeType": "multipart/alternative",
                    "headers": [
                        {"name": "From", "value": "Jane Doe <jane@acme.io>"},
                        {"name": "To", "value": "\"Manager, Casey\" <me@ourco.com>, bob@acme.io"},
                        {"name": "Subject", "value": "Renewal"}
                    ],
                    "parts": [
                        {"mimeType": "text/plain", "body": {"data": b64("Can we talk renewal?")}},
                        {"mimeType": "text/html", "body": {"data": b64("<p>Can we talk renewal?</p>")}}
                    ]
                }
            }]
        })
    }

    #[test]
    fn test_split_address_list_respects_quotes() {
        let parts = split_address_list("\"Doe, Jane\" <jane@acme.io>, bob@acme.io ,");
        assert_eq!(parts, vec!["\"Doe, Jane\" <jane@acme.io>", "bob@acme.io"]);
    }

    #[test]
    fn test_convert_thread_decodes_bodies_and_headers() {
        let detail: ThreadDetail = serde_json::from_value(thread_json()).unwrap();
        let thread = convert_thread(detail);
        let msg = &thread.messages[0];
        assert_eq!(msg.from.as_deref(), Some("Jane Doe <jane@acme.io>"));
        assert_eq!(msg.to.len(), 2);
        assert_eq!(msg.body_text.as_deref(), Some("Can we talk renewal?"));
        assert_eq!(msg.body_html.as_deref(), Some("<p>Can we talk renewal?</p>"));
        assert_eq!(msg.date.as_deref(), Some("2026-01-01T00:00:00+00:00"));
        assert_eq!(thread.subject().as_deref(), Some("Renewal"));
        assert_eq!(
            thread.last_message_date().as_deref(),
            Some("2026-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_date_header_fallback() {
        assert_eq!(
            parse_date_header("Sun, 8 Feb 2026 09:30:00 -0500 (EST)").as_deref(),
            Some("2026-02-08T14:30:00+00:00")
        );
        assert!(parse_date_header("yesterday").is_none());
    }

    #[test]
    fn test_decode_accepts_padding() {
        assert_eq!(decode_url_safe_base64("aGk=").as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_list_thread_ids_paginates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/threads"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "threads": [{"id": "t3"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/threads"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "threads": [{"id": "t1"}, {"id": "t2"}],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let client = GoogleClient::with_base_urls(reqwest::Client::new(), &server.uri(), &server.uri());
        let ids = client.list_thread_ids("tok", "newer_than:30d", 10).await.unwrap();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_fetch_thread_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/threads/t-100"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = GoogleClient::with_base_urls(reqwest::Client::new(), &server.uri(), &server.uri());
        let err = client.fetch_thread("tok", "t-100").await.unwrap_err();
        assert!(matches!(err, GoogleApiError::AuthExpired));
    }

    #[tokio::test]
    async fn test_fetch_thread() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/threads/t-100"))
            .and(query_param("format", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(thread_json()))
            .mount(&server)
            .await;

        let client = GoogleClient::with_base_urls(reqwest::Client::new(), &server.uri(), &server.uri());
        let thread = client.fetch_thread("tok", "t-100").await.unwrap();
        assert_eq!(thread.id, "t-100");
        assert_eq!(thread.messages.len(), 1);
    }
}
