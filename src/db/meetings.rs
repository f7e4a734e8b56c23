use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::BotStatus;

const MEETING_COLUMNS: &str = "m.meeting_id, m.user_id, m.google_event_id, m.calendar_id, m.title,
    m.description, m.location, m.meeting_url, m.start_time, m.end_time, m.attendees,
    m.organizer, m.company_id, m.customer_id, m.summary, m.sentiment, m.sentiment_score,
    m.transcript, m.recall_bot_id, m.bot_status, m.last_analyzed_at, m.created_at, m.updated_at";

impl Db {
    // =========================================================================
    // Meetings
    // =========================================================================

    fn map_meeting_row(row: &rusqlite::Row) -> rusqlite::Result<DbMeeting> {
        Ok(DbMeeting {
            meeting_id: row.get(0)?,
            user_id: row.get(1)?,
            google_event_id: row.get(2)?,
            calendar_id: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            location: row.get(6)?,
            meeting_url: row.get(7)?,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
            attendees: row.get(10)?,
            organizer: row.get(11)?,
            company_id: row.get(12)?,
            customer_id: row.get(13)?,
            summary: row.get(14)?,
            sentiment: row.get(15)?,
            sentiment_score: row.get(16)?,
            transcript: row.get(17)?,
            recall_bot_id: row.get(18)?,
            bot_status: row.get(19)?,
            last_analyzed_at: row.get(20)?,
            created_at: row.get(21)?,
            updated_at: row.get(22)?,
        })
    }

    fn query_meetings(
        &self,
        sql_tail: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DbMeeting>, DbError> {
        let sql = format!("SELECT {MEETING_COLUMNS} FROM meetings m {sql_tail}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, Self::map_meeting_row)?;
        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }
        Ok(meetings)
    }

    /// Insert or refresh a calendar event keyed by (`user_id`, `google_event_id`).
    ///
    /// Calendar fields are overwritten; analysis and recording state is kept.
    /// A company/customer link is only replaced by a non-null one.
    pub fn upsert_meeting(&self, user_id: &str, meeting: &MeetingUpsert) -> Result<String, DbError> {
        let now = now_rfc3339();
        let attendees =
            serde_json::to_string(&meeting.attendees).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO meetings (
                meeting_id, user_id, google_event_id, calendar_id, title, description,
                location, meeting_url, start_time, end_time, attendees, organizer,
                company_id, customer_id, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
             ON CONFLICT(user_id, google_event_id) DO UPDATE SET
                calendar_id = excluded.calendar_id,
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                meeting_url = excluded.meeting_url,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                attendees = excluded.attendees,
                organizer = excluded.organizer,
                company_id = COALESCE(excluded.company_id, meetings.company_id),
                customer_id = COALESCE(excluded.customer_id, meetings.customer_id),
                updated_at = excluded.updated_at",
            params![
                new_id(),
                user_id,
                meeting.google_event_id,
                meeting.calendar_id,
                meeting.title,
                meeting.description,
                meeting.location,
                meeting.meeting_url,
                meeting.start_time,
                meeting.end_time,
                attendees,
                meeting.organizer,
                meeting.company_id,
                meeting.customer_id,
                now,
            ],
        )?;
        let meeting_id = self.conn.query_row(
            "SELECT meeting_id FROM meetings WHERE user_id = ?1 AND google_event_id = ?2",
            params![user_id, meeting.google_event_id],
            |row| row.get(0),
        )?;
        Ok(meeting_id)
    }

    pub fn get_meeting(&self, user_id: &str, meeting_id: &str) -> Result<Option<DbMeeting>, DbError> {
        Ok(self
            .query_meetings("WHERE m.user_id = ?1 AND m.meeting_id = ?2", &[&user_id, &meeting_id])?
            .into_iter()
            .next())
    }

    /// Meetings of a user, newest first. `upcoming_only` keeps events that
    /// have not started yet, soonest first.
    pub fn list_meetings(&self, user_id: &str, upcoming_only: bool) -> Result<Vec<DbMeeting>, DbError> {
        if upcoming_only {
            let now = now_rfc3339();
            self.query_meetings(
                "WHERE m.user_id = ?1 AND m.start_time >= ?2 ORDER BY m.start_time",
                &[&user_id, &now],
            )
        } else {
            self.query_meetings(
                "WHERE m.user_id = ?1 ORDER BY m.start_time DESC",
                &[&user_id],
            )
        }
    }

    pub fn list_company_meetings(
        &self,
        user_id: &str,
        company_id: &str,
    ) -> Result<Vec<DbMeeting>, DbError> {
        self.query_meetings(
            "WHERE m.user_id = ?1 AND m.company_id = ?2 ORDER BY m.start_time DESC",
            &[&user_id, &company_id],
        )
    }

    /// Meetings linked to the customer or listing their address as an attendee.
    pub fn list_customer_meetings(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<Vec<DbMeeting>, DbError> {
        self.query_meetings(
            "WHERE m.user_id = ?1 AND (
                m.customer_id = ?2
                OR EXISTS (
                    SELECT 1 FROM json_each(m.attendees) a
                    JOIN customers cu ON cu.customer_id = ?2
                    WHERE LOWER(a.value) = cu.email
                )
             )
             ORDER BY m.start_time DESC",
            &[&user_id, &customer_id],
        )
    }

    pub fn find_meeting_by_bot(&self, bot_id: &str) -> Result<Option<DbMeeting>, DbError> {
        Ok(self
            .query_meetings("WHERE m.recall_bot_id = ?1", &[&bot_id])?
            .into_iter()
            .next())
    }

    /// Mirror the recording bot on the meeting row.
    pub fn set_meeting_bot(
        &self,
        meeting_id: &str,
        bot_id: Option<&str>,
        status: BotStatus,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE meetings SET recall_bot_id = ?2, bot_status = ?3, updated_at = ?4
             WHERE meeting_id = ?1",
            params![meeting_id, bot_id, status, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_meeting_bot_status(&self, meeting_id: &str, status: BotStatus) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE meetings SET bot_status = ?2, updated_at = ?3 WHERE meeting_id = ?1",
            params![meeting_id, status, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_meeting_transcript(&self, meeting_id: &str, transcript: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE meetings SET transcript = ?2, updated_at = ?3 WHERE meeting_id = ?1",
            params![meeting_id, transcript, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn apply_meeting_analysis(
        &self,
        meeting_id: &str,
        summary: Option<&str>,
        sentiment: Option<&str>,
        sentiment_score: Option<i64>,
        analyzed_at: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE meetings SET
                summary = COALESCE(?2, summary),
                sentiment = COALESCE(?3, sentiment),
                sentiment_score = COALESCE(?4, sentiment_score),
                last_analyzed_at = ?5,
                updated_at = ?5
             WHERE meeting_id = ?1",
            params![meeting_id, summary, sentiment, sentiment_score, analyzed_at],
        )?;
        Ok(())
    }

    /// The meeting's company id, if linked.
    pub fn get_meeting_company_id(&self, meeting_id: &str) -> Result<Option<String>, DbError> {
        let company: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT company_id FROM meetings WHERE meeting_id = ?1",
                params![meeting_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(company.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};

    fn event(id: &str) -> MeetingUpsert {
        MeetingUpsert {
            google_event_id: id.to_string(),
            calendar_id: "primary".to_string(),
            title: "Acme QBR".to_string(),
            start_time: "2026-04-01T15:00:00+00:00".to_string(),
            attendees: vec!["jane@acme.io".to_string(), "me@ourco.com".to_string()],
            meeting_url: Some("https://meet.google.com/abc-defg-hij".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_meeting_is_keyed_on_event() {
        let db = test_db();
        let first = db.upsert_meeting(TEST_USER, &event("evt-1")).unwrap();
        let mut renamed = event("evt-1");
        renamed.title = "Acme QBR (moved)".to_string();
        let second = db.upsert_meeting(TEST_USER, &renamed).unwrap();
        assert_eq!(first, second);

        let meeting = db.get_meeting(TEST_USER, &first).unwrap().unwrap();
        assert_eq!(meeting.title, "Acme QBR (moved)");
        assert_eq!(meeting.bot_status, BotStatus::None);
        assert_eq!(db.list_meetings(TEST_USER, false).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_preserves_bot_state() {
        let db = test_db();
        let id = db.upsert_meeting(TEST_USER, &event("evt-1")).unwrap();
        db.set_meeting_bot(&id, Some("bot-1"), BotStatus::Scheduled).unwrap();
        db.upsert_meeting(TEST_USER, &event("evt-1")).unwrap();

        let meeting = db.find_meeting_by_bot("bot-1").unwrap().unwrap();
        assert_eq!(meeting.meeting_id, id);
        assert_eq!(meeting.bot_status, BotStatus::Scheduled);
    }

    #[test]
    fn test_customer_meetings_match_attendee_email() {
        let db = test_db();
        db.upsert_meeting(TEST_USER, &event("evt-1")).unwrap();
        let jane = db
            .create_customer(
                TEST_USER,
                &NewCustomer {
                    email: "jane@acme.io".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let bob = db
            .create_customer(
                TEST_USER,
                &NewCustomer {
                    email: "bob@acme.io".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(db.list_customer_meetings(TEST_USER, &jane.customer_id).unwrap().len(), 1);
        assert!(db.list_customer_meetings(TEST_USER, &bob.customer_id).unwrap().is_empty());
    }
}
