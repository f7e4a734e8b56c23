use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::ProcessingStage;

/// Thread header as imported from Gmail.
#[derive(Debug, Clone, Default)]
pub struct ThreadUpsert {
    pub thread_id: String,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub last_message_date: Option<String>,
}

const THREAD_COLUMNS: &str = "t.thread_id, t.user_id, t.subject, t.snippet, t.last_message_date,
    t.summary, t.sentiment, t.sentiment_score, t.resolution_status, t.problem_statement,
    t.timeline_summary, t.last_analyzed_at, t.processing_stage, t.created_at, t.updated_at";

impl Db {
    // =========================================================================
    // Threads
    // =========================================================================

    fn map_thread_row(row: &rusqlite::Row) -> rusqlite::Result<DbThread> {
        Ok(DbThread {
            thread_id: row.get(0)?,
            user_id: row.get(1)?,
            subject: row.get(2)?,
            snippet: row.get(3)?,
            last_message_date: row.get(4)?,
            summary: row.get(5)?,
            sentiment: row.get(6)?,
            sentiment_score: row.get(7)?,
            resolution_status: row.get(8)?,
            problem_statement: row.get(9)?,
            timeline_summary: row.get(10)?,
            last_analyzed_at: row.get(11)?,
            processing_stage: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn query_threads(
        &self,
        sql_tail: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DbThread>, DbError> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM threads t {sql_tail}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, Self::map_thread_row)?;
        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    /// Insert or refresh a thread header. Returns `true` when the thread is new.
    ///
    /// New threads start in the `pending` stage.
    pub fn upsert_thread(&self, user_id: &str, thread: &ThreadUpsert) -> Result<bool, DbError> {
        let now = now_rfc3339();
        let inserted = self.conn.execute(
            "INSERT INTO threads (
                thread_id, user_id, subject, snippet, last_message_date,
                processing_stage, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(thread_id) DO NOTHING",
            params![
                thread.thread_id,
                user_id,
                thread.subject,
                thread.snippet,
                thread.last_message_date,
                ProcessingStage::Pending,
                now,
            ],
        )?;
        if inserted > 0 {
            return Ok(true);
        }
        self.conn.execute(
            "UPDATE threads SET
                subject = COALESCE(?3, subject),
                snippet = COALESCE(?4, snippet),
                last_message_date = COALESCE(?5, last_message_date),
                updated_at = ?6
             WHERE thread_id = ?1 AND user_id = ?2",
            params![
                thread.thread_id,
                user_id,
                thread.subject,
                thread.snippet,
                thread.last_message_date,
                now,
            ],
        )?;
        Ok(false)
    }

    pub fn get_thread(&self, user_id: &str, thread_id: &str) -> Result<Option<DbThread>, DbError> {
        Ok(self
            .query_threads("WHERE t.user_id = ?1 AND t.thread_id = ?2", &[&user_id, &thread_id])?
            .into_iter()
            .next())
    }

    /// Raw stage text; `None` for a missing thread or a NULL stage.
    pub fn get_thread_stage(&self, thread_id: &str) -> Result<Option<String>, DbError> {
        let stage: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT processing_stage FROM threads WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stage.flatten())
    }

    pub fn set_thread_stage(&self, thread_id: &str, stage: ProcessingStage) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE threads SET processing_stage = ?2, updated_at = ?3 WHERE thread_id = ?1",
            params![thread_id, stage, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Move threads left mid-pipeline by a process that exited back to
    /// `pending`. The analysis queue lives in memory, so nothing else would
    /// ever pick them up. `user_id` narrows the reset to one user.
    pub fn requeue_unfinished_threads(&self, user_id: Option<&str>) -> Result<usize, DbError> {
        let rows = self.conn.execute(
            "UPDATE threads SET processing_stage = 'pending', updated_at = ?2
             WHERE processing_stage IN ('resolving_entities', 'queued', 'analyzing')
               AND (?1 IS NULL OR user_id = ?1)",
            params![user_id, now_rfc3339()],
        )?;
        Ok(rows)
    }

    /// Threads of a user sitting in `stage`, oldest first.
    pub fn list_threads_in_stage(
        &self,
        user_id: &str,
        stage: ProcessingStage,
    ) -> Result<Vec<DbThread>, DbError> {
        self.query_threads(
            "WHERE t.user_id = ?1 AND t.processing_stage = ?2 ORDER BY t.created_at",
            &[&user_id, &stage],
        )
    }

    /// Threads linked to a company, newest activity first.
    pub fn list_company_threads(
        &self,
        user_id: &str,
        company_id: &str,
    ) -> Result<Vec<DbThread>, DbError> {
        self.query_threads(
            "JOIN thread_company_links l ON l.thread_id = t.thread_id
             WHERE t.user_id = ?1 AND l.company_id = ?2
             ORDER BY t.last_message_date DESC",
            &[&user_id, &company_id],
        )
    }

    /// Threads a customer participates in, newest activity first.
    pub fn list_customer_threads(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<Vec<DbThread>, DbError> {
        self.query_threads(
            "JOIN thread_participants p ON p.thread_id = t.thread_id
             WHERE t.user_id = ?1 AND p.customer_id = ?2
             ORDER BY t.last_message_date DESC",
            &[&user_id, &customer_id],
        )
    }

    /// Persist the result of an analysis pass.
    pub fn apply_thread_analysis(
        &self,
        thread_id: &str,
        update: &ThreadAnalysisUpdate,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE threads SET
                summary = COALESCE(?2, summary),
                sentiment = COALESCE(?3, sentiment),
                sentiment_score = COALESCE(?4, sentiment_score),
                resolution_status = COALESCE(?5, resolution_status),
                problem_statement = COALESCE(?6, problem_statement),
                timeline_summary = COALESCE(?7, timeline_summary),
                last_analyzed_at = ?8,
                updated_at = ?8
             WHERE thread_id = ?1",
            params![
                thread_id,
                update.summary,
                update.sentiment,
                update.sentiment_score,
                update.resolution_status,
                update.problem_statement,
                update.timeline_summary,
                update.last_analyzed_at,
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // Participants and company links
    // =========================================================================

    /// Link a customer to a thread. Returns `false` when already linked.
    pub fn add_thread_participant(
        &self,
        user_id: &str,
        thread_id: &str,
        customer_id: &str,
    ) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO thread_participants (thread_id, customer_id, user_id)
             VALUES (?1, ?2, ?3)",
            params![thread_id, customer_id, user_id],
        )?;
        Ok(rows > 0)
    }

    /// Link a company to a thread. Returns `false` when already linked.
    pub fn add_thread_company_link(
        &self,
        user_id: &str,
        thread_id: &str,
        company_id: &str,
    ) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO thread_company_links (thread_id, company_id, user_id)
             VALUES (?1, ?2, ?3)",
            params![thread_id, company_id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn list_thread_participants(&self, thread_id: &str) -> Result<Vec<DbCustomer>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT cu.customer_id, cu.user_id, cu.company_id, co.company_name,
                    cu.email, cu.full_name, cu.title, cu.domain_match, cu.status,
                    cu.health_score, cu.sentiment, cu.created_at, cu.updated_at
             FROM thread_participants p
             JOIN customers cu ON cu.customer_id = p.customer_id
             LEFT JOIN companies co ON co.company_id = cu.company_id
             WHERE p.thread_id = ?1
             ORDER BY cu.email",
        )?;
        let rows = stmt.query_map(params![thread_id], |row| {
            Ok(DbCustomer {
                customer_id: row.get(0)?,
                user_id: row.get(1)?,
                company_id: row.get(2)?,
                company_name: row.get(3)?,
                email: row.get(4)?,
                full_name: row.get(5)?,
                title: row.get(6)?,
                domain_match: row.get(7)?,
                status: row.get(8)?,
                health_score: row.get(9)?,
                sentiment: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
            })
        })?;
        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }
}
