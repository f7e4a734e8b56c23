//! Google Calendar API v3: event and calendar-list fetching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_response, send_with_retry, GoogleApiError, GoogleClient};

// ============================================================================
// API response types (deserialized from Google Calendar JSON)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<GoogleEventRaw>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventRaw {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    #[serde(default)]
    attendees: Vec<Attendee>,
    organizer: Option<Organizer>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    hangout_link: Option<String>,
    #[serde(default)]
    conference_data: Option<ConferenceData>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attendee {
    #[serde(default)]
    email: String,
    #[serde(default)]
    resource: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Organizer {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceData {
    #[serde(default)]
    entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryPoint {
    #[serde(default)]
    entry_point_type: String,
    #[serde(default)]
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarEntry {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    primary: Option<bool>,
    #[serde(default)]
    access_role: Option<String>,
}

// ============================================================================
// Public types
// ============================================================================

/// A normalized calendar event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: String,
    pub end: Option<String>,
    /// Lowercased attendee emails, resource rooms removed.
    pub attendees: Vec<String>,
    pub organizer: Option<String>,
    /// Video link: Meet hangout link or the first video entry point.
    pub meeting_url: Option<String>,
    pub is_all_day: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSummary {
    pub id: String,
    pub summary: String,
    pub primary: bool,
    pub access_role: Option<String>,
}

// ============================================================================
// Calendar API
// ============================================================================

impl GoogleClient {
    /// Fetch events of one calendar in `[time_min, time_max)`.
    ///
    /// Handles pagination (maxResults=250, pageToken). Recurring events are
    /// expanded. Cancelled events and resource rooms are dropped.
    pub async fn fetch_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, GoogleApiError> {
        let url = format!(
            "{}/calendars/{}/events",
            self.calendar_base,
            url::form_urlencoded::byte_serialize(calendar_id.as_bytes()).collect::<String>()
        );
        let time_min = time_min.to_rfc3339();
        let time_max = time_max.to_rfc3339();

        let mut all_events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("timeMin", time_min.as_str()),
                    ("timeMax", time_max.as_str()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                    ("maxResults", "250"),
                ]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let resp = check_response(send_with_retry(request, &self.retry).await?).await?;
            let body: EventListResponse = resp.json().await?;

            all_events.extend(
                body.items
                    .into_iter()
                    .filter_map(|item| convert_event(item, calendar_id)),
            );

            page_token = body.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_events)
    }

    /// Calendars visible to the user.
    pub async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarSummary>, GoogleApiError> {
        let url = format!("{}/users/me/calendarList", self.calendar_base);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(&url).bearer_auth(access_token);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let resp = check_response(send_with_retry(request, &self.retry).await?).await?;
            let body: CalendarListResponse = resp.json().await?;

            calendars.extend(body.items.into_iter().map(|c| CalendarSummary {
                summary: c.summary.unwrap_or_else(|| c.id.clone()),
                id: c.id,
                primary: c.primary.unwrap_or(false),
                access_role: c.access_role,
            }));

            page_token = body.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(calendars)
    }
}

fn convert_event(item: GoogleEventRaw, calendar_id: &str) -> Option<CalendarEvent> {
    if item.status.as_deref() == Some("cancelled") {
        return None;
    }

    let start = item
        .start
        .as_ref()
        .and_then(|s| s.date_time.clone().or_else(|| s.date.clone()))?;
    let end = item
        .end
        .as_ref()
        .and_then(|s| s.date_time.clone().or_else(|| s.date.clone()));
    let is_all_day = item
        .start
        .as_ref()
        .map(|s| s.date_time.is_none() && s.date.is_some())
        .unwrap_or(false);

    let attendees: Vec<String> = item
        .attendees
        .iter()
        .filter(|a| a.resource != Some(true))
        .map(|a| a.email.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let meeting_url = item.hangout_link.clone().or_else(|| {
        item.conference_data.as_ref().and_then(|c| {
            c.entry_points
                .iter()
                .find(|e| e.entry_point_type == "video" && !e.uri.is_empty())
                .map(|e| e.uri.clone())
        })
    });

    Some(CalendarEvent {
        id: item.id,
        calendar_id: calendar_id.to_string(),
        summary: item.summary.unwrap_or_else(|| "(No title)".to_string()),
        description: item.description.filter(|d| !d.trim().is_empty()),
        location: item.location.filter(|l| !l.trim().is_empty()),
        start,
        end,
        attendees,
        organizer: item
            .organizer
            .map(|o| o.email.to_lowercase())
            .filter(|e| !e.is_empty()),
        meeting_url,
        is_all_day,
    })
}

/// Parse an event start/end string to UTC. Date-only values are midnight UTC.
pub fn parse_event_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if s.contains('T') {
        DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00"))
            .or_else(|_| DateTime::parse_from_rfc3339(s))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    } else {
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
    }
}
