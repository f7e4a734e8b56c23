use rusqlite::params;

use super::*;

/// A message as imported from Gmail.
#[derive(Debug, Clone, Default)]
pub struct EmailInsert {
    pub message_id: String,
    pub thread_id: String,
    pub from_address: Option<String>,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub sent_date: Option<String>,
}

const EMAIL_COLUMNS: &str = "message_id, thread_id, user_id, from_address, to_addresses,
    cc_addresses, subject, snippet, body_text, body_html, sent_date, customer_id, summary,
    created_at";

impl Db {
    // =========================================================================
    // Emails
    // =========================================================================

    fn map_email_row(row: &rusqlite::Row) -> rusqlite::Result<DbEmail> {
        Ok(DbEmail {
            message_id: row.get(0)?,
            thread_id: row.get(1)?,
            user_id: row.get(2)?,
            from_address: row.get(3)?,
            to_addresses: row.get(4)?,
            cc_addresses: row.get(5)?,
            subject: row.get(6)?,
            snippet: row.get(7)?,
            body_text: row.get(8)?,
            body_html: row.get(9)?,
            sent_date: row.get(10)?,
            customer_id: row.get(11)?,
            summary: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    /// Store a message. Returns `false` when it was already imported.
    pub fn insert_email(&self, user_id: &str, email: &EmailInsert) -> Result<bool, DbError> {
        let to = serde_json::to_string(&email.to_addresses).unwrap_or_else(|_| "[]".into());
        let cc = serde_json::to_string(&email.cc_addresses).unwrap_or_else(|_| "[]".into());
        let rows = self.conn.execute(
            "INSERT INTO emails (
                message_id, thread_id, user_id, from_address, to_addresses, cc_addresses,
                subject, snippet, body_text, body_html, sent_date, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(message_id) DO NOTHING",
            params![
                email.message_id,
                email.thread_id,
                user_id,
                email.from_address,
                to,
                cc,
                email.subject,
                email.snippet,
                email.body_text,
                email.body_html,
                email.sent_date,
                now_rfc3339(),
            ],
        )?;
        Ok(rows > 0)
    }

    /// Messages of a thread in conversation order. Undated messages sort last.
    pub fn list_thread_emails(&self, thread_id: &str) -> Result<Vec<DbEmail>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails
             WHERE thread_id = ?1
             ORDER BY sent_date IS NULL, sent_date, created_at"
        ))?;
        let rows = stmt.query_map(params![thread_id], Self::map_email_row)?;
        let mut emails = Vec::new();
        for row in rows {
            emails.push(row?);
        }
        Ok(emails)
    }

    /// Record which customer sent a message.
    pub fn set_email_customer(&self, message_id: &str, customer_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE emails SET customer_id = ?2 WHERE message_id = ?1",
            params![message_id, customer_id],
        )?;
        Ok(())
    }

    /// Newest messages (across all users) still lacking a summary.
    pub fn list_unsummarized_emails(&self, limit: usize) -> Result<Vec<DbEmail>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails
             WHERE summary IS NULL
             ORDER BY sent_date DESC, created_at DESC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], Self::map_email_row)?;
        let mut emails = Vec::new();
        for row in rows {
            emails.push(row?);
        }
        Ok(emails)
    }

    pub fn set_email_summary(&self, message_id: &str, summary: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE emails SET summary = ?2 WHERE message_id = ?1",
            params![message_id, summary],
        )?;
        Ok(())
    }
}
