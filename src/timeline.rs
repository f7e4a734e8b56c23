//! Merged email + meeting history for a company or customer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Db, DbError, DbMeeting, DbThread};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineKind {
    Email,
    Meeting,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub kind: TimelineKind,
    pub id: String,
    pub title: String,
    pub occurred_at: String,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
}

impl From<DbThread> for TimelineItem {
    fn from(thread: DbThread) -> Self {
        Self {
            kind: TimelineKind::Email,
            occurred_at: thread
                .last_message_date
                .clone()
                .unwrap_or_else(|| thread.updated_at.clone()),
            title: thread
                .subject
                .clone()
                .unwrap_or_else(|| "(No subject)".to_string()),
            summary: thread.summary.or(thread.snippet),
            sentiment: thread.sentiment,
            id: thread.thread_id,
        }
    }
}

impl From<DbMeeting> for TimelineItem {
    fn from(meeting: DbMeeting) -> Self {
        Self {
            kind: TimelineKind::Meeting,
            id: meeting.meeting_id,
            title: meeting.title,
            occurred_at: meeting.start_time,
            summary: meeting.summary,
            sentiment: meeting.sentiment,
        }
    }
}

pub fn company_timeline(
    db: &Db,
    user_id: &str,
    company_id: &str,
) -> Result<Vec<TimelineItem>, DbError> {
    let threads = db.list_company_threads(user_id, company_id)?;
    let meetings = db.list_company_meetings(user_id, company_id)?;
    Ok(merge(threads, meetings))
}

pub fn customer_timeline(
    db: &Db,
    user_id: &str,
    customer_id: &str,
) -> Result<Vec<TimelineItem>, DbError> {
    let threads = db.list_customer_threads(user_id, customer_id)?;
    let meetings = db.list_customer_meetings(user_id, customer_id)?;
    Ok(merge(threads, meetings))
}

fn merge(threads: Vec<DbThread>, meetings: Vec<DbMeeting>) -> Vec<TimelineItem> {
    let mut items: Vec<TimelineItem> = threads
        .into_iter()
        .map(TimelineItem::from)
        .chain(meetings.into_iter().map(TimelineItem::from))
        .collect();
    // Newest first; unparsable dates sink to the bottom.
    items.sort_by_key(|item| std::cmp::Reverse(sort_key(&item.occurred_at)));
    items
}

fn sort_key(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::db::threads::ThreadUpsert;
    use crate::db::{MeetingUpsert, NewCompany, NewCustomer};

    #[test]
    fn test_company_timeline_is_merged_newest_first() {
        let db = test_db();
        let company = db
            .create_company(
                TEST_USER,
                &NewCompany {
                    company_name: "Acme".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let customer = db
            .create_customer(
                TEST_USER,
                &NewCustomer {
                    email: "dana@acme.io".into(),
                    company_id: Some(company.company_id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        for (id, date) in [("t-old", "2026-01-05T10:00:00+00:00"), ("t-new", "2026-03-05T10:00:00Z")] {
            db.upsert_thread(
                TEST_USER,
                &ThreadUpsert {
                    thread_id: id.into(),
                    subject: Some(format!("Subject {id}")),
                    last_message_date: Some(date.into()),
                    ..Default::default()
                },
            )
            .unwrap();
            db.add_thread_company_link(TEST_USER, id, &company.company_id).unwrap();
            db.add_thread_participant(TEST_USER, id, &customer.customer_id).unwrap();
        }
        db.upsert_meeting(
            TEST_USER,
            &MeetingUpsert {
                google_event_id: "evt-1".into(),
                calendar_id: "primary".into(),
                title: "QBR".into(),
                start_time: "2026-02-01T15:00:00-05:00".into(),
                attendees: vec!["dana@acme.io".into()],
                company_id: Some(company.company_id.clone()),
                customer_id: Some(customer.customer_id.clone()),
                ..Default::default()
            },
        )
        .unwrap();

        let items = company_timeline(&db, TEST_USER, &company.company_id).unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids[0], "t-new");
        assert_eq!(items[1].kind, TimelineKind::Meeting);
        assert_eq!(ids[2], "t-old");

        let items = customer_timeline(&db, TEST_USER, &customer.customer_id).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Subject t-new");
    }
}
