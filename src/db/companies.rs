use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::CompanyStatus;

const COMPANY_COLUMNS: &str = "c.company_id, c.user_id, c.company_name, c.domain_name, c.status,
    c.health_score, c.mrr, c.renewal_date, c.notes, c.created_at, c.updated_at,
    (SELECT COUNT(*) FROM customers cu WHERE cu.company_id = c.company_id),
    (SELECT COUNT(*) FROM next_steps ns
        WHERE ns.company_id = c.company_id AND ns.status = 'pending')";

impl Db {
    // =========================================================================
    // Companies
    // =========================================================================

    fn map_company_row(row: &rusqlite::Row) -> rusqlite::Result<DbCompany> {
        Ok(DbCompany {
            company_id: row.get(0)?,
            user_id: row.get(1)?,
            company_name: row.get(2)?,
            domain_name: row.get(3)?,
            status: row.get(4)?,
            health_score: row.get(5)?,
            mrr: row.get(6)?,
            renewal_date: row.get(7)?,
            notes: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            customer_count: row.get(11)?,
            open_next_steps: row.get(12)?,
        })
    }

    /// All companies for a user, alphabetical.
    pub fn list_companies(&self, user_id: &str) -> Result<Vec<DbCompany>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies c
             WHERE c.user_id = ?1
             ORDER BY c.company_name COLLATE NOCASE"
        ))?;
        let rows = stmt.query_map(params![user_id], Self::map_company_row)?;
        let mut companies = Vec::new();
        for row in rows {
            companies.push(row?);
        }
        Ok(companies)
    }

    pub fn get_company(&self, user_id: &str, company_id: &str) -> Result<Option<DbCompany>, DbError> {
        let company = self
            .conn
            .query_row(
                &format!(
                    "SELECT {COMPANY_COLUMNS} FROM companies c
                     WHERE c.user_id = ?1 AND c.company_id = ?2"
                ),
                params![user_id, company_id],
                Self::map_company_row,
            )
            .optional()?;
        Ok(company)
    }

    pub fn find_company_by_domain(
        &self,
        user_id: &str,
        domain: &str,
    ) -> Result<Option<DbCompany>, DbError> {
        let company = self
            .conn
            .query_row(
                &format!(
                    "SELECT {COMPANY_COLUMNS} FROM companies c
                     WHERE c.user_id = ?1 AND c.domain_name = ?2"
                ),
                params![user_id, domain.to_lowercase()],
                Self::map_company_row,
            )
            .optional()?;
        Ok(company)
    }

    /// Insert a company. A second company with the same domain is a conflict.
    pub fn create_company(&self, user_id: &str, new: &NewCompany) -> Result<DbCompany, DbError> {
        let company_id = new_id();
        let now = now_rfc3339();
        let domain = new
            .domain_name
            .as_deref()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty());
        let result = self.conn.execute(
            "INSERT INTO companies (
                company_id, user_id, company_name, domain_name, status, mrr,
                renewal_date, notes, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                company_id,
                user_id,
                new.company_name.trim(),
                domain,
                new.status.unwrap_or(CompanyStatus::Active),
                new.mrr,
                new.renewal_date,
                new.notes,
                now,
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(DbError::Conflict(format!(
                    "Company with domain '{}'",
                    domain.unwrap_or_default()
                )));
            }
            Err(e) => return Err(e.into()),
        }
        self.get_company(user_id, &company_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Return the company owning `domain`, creating it on first sight.
    ///
    /// Returns `(company, created)`.
    pub fn find_or_create_company_for_domain(
        &self,
        user_id: &str,
        domain: &str,
        company_name: &str,
    ) -> Result<(DbCompany, bool), DbError> {
        if let Some(existing) = self.find_company_by_domain(user_id, domain)? {
            return Ok((existing, false));
        }
        let new = NewCompany {
            company_name: company_name.to_string(),
            domain_name: Some(domain.to_string()),
            ..Default::default()
        };
        match self.create_company(user_id, &new) {
            Ok(company) => Ok((company, true)),
            // Lost a race with another writer; the row exists now.
            Err(DbError::Conflict(_)) => self
                .find_company_by_domain(user_id, domain)?
                .map(|c| (c, false))
                .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows)),
            Err(e) => Err(e),
        }
    }

    /// Apply a partial update. Returns `None` when the company does not exist.
    pub fn update_company(
        &self,
        user_id: &str,
        company_id: &str,
        update: &CompanyUpdate,
    ) -> Result<Option<DbCompany>, DbError> {
        let rows = self.conn.execute(
            "UPDATE companies SET
                company_name = COALESCE(?3, company_name),
                status = COALESCE(?4, status),
                health_score = COALESCE(?5, health_score),
                mrr = COALESCE(?6, mrr),
                renewal_date = COALESCE(?7, renewal_date),
                notes = COALESCE(?8, notes),
                updated_at = ?9
             WHERE user_id = ?1 AND company_id = ?2",
            params![
                user_id,
                company_id,
                update.company_name,
                update.status,
                update.health_score,
                update.mrr,
                update.renewal_date,
                update.notes,
                now_rfc3339(),
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_company(user_id, company_id)
    }

    /// Write a recomputed health score; `None` clears it.
    pub fn set_company_health(
        &self,
        user_id: &str,
        company_id: &str,
        score: Option<i64>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE companies SET health_score = ?3, updated_at = ?4
             WHERE user_id = ?1 AND company_id = ?2",
            params![user_id, company_id, score, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete a company. Next steps and feature requests cascade; customers
    /// and meetings are unlinked.
    pub fn delete_company(&self, user_id: &str, company_id: &str) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "DELETE FROM companies WHERE user_id = ?1 AND company_id = ?2",
            params![user_id, company_id],
        )?;
        Ok(rows > 0)
    }

    /// Companies linked to a thread, in link order.
    pub fn get_thread_company_ids(&self, thread_id: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT company_id FROM thread_company_links WHERE thread_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![thread_id], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Sentiment scores feeding the health score: linked threads and the
    /// company's meetings analysed at or after `since`.
    pub fn company_sentiment_scores(
        &self,
        user_id: &str,
        company_id: &str,
        since: &str,
    ) -> Result<Vec<i64>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT t.sentiment_score FROM threads t
             JOIN thread_company_links l ON l.thread_id = t.thread_id
             WHERE t.user_id = ?1 AND l.company_id = ?2
               AND t.sentiment_score IS NOT NULL AND t.last_analyzed_at >= ?3
             UNION ALL
             SELECT m.sentiment_score FROM meetings m
             WHERE m.user_id = ?1 AND m.company_id = ?2
               AND m.sentiment_score IS NOT NULL AND m.last_analyzed_at >= ?3",
        )?;
        let rows = stmt.query_map(params![user_id, company_id, since], |row| row.get(0))?;
        let mut scores = Vec::new();
        for row in rows {
            scores.push(row?);
        }
        Ok(scores)
    }
}
