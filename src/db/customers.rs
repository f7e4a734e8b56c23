use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::CustomerStatus;

const CUSTOMER_COLUMNS: &str = "cu.customer_id, cu.user_id, cu.company_id, co.company_name,
    cu.email, cu.full_name, cu.title, cu.domain_match, cu.status, cu.health_score,
    cu.sentiment, cu.created_at, cu.updated_at";

impl Db {
    // =========================================================================
    // Customers
    // =========================================================================

    fn map_customer_row(row: &rusqlite::Row) -> rusqlite::Result<DbCustomer> {
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
    }

    fn query_customers(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DbCustomer>, DbError> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS}
             FROM customers cu
             LEFT JOIN companies co ON co.company_id = cu.company_id
             WHERE {where_clause}
             ORDER BY COALESCE(cu.full_name, cu.email) COLLATE NOCASE"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, Self::map_customer_row)?;
        let mut customers = Vec::new();
        for row in rows {
            customers.push(row?);
        }
        Ok(customers)
    }

    pub fn list_customers(&self, user_id: &str) -> Result<Vec<DbCustomer>, DbError> {
        self.query_customers("cu.user_id = ?1", &[&user_id])
    }

    pub fn list_company_customers(
        &self,
        user_id: &str,
        company_id: &str,
    ) -> Result<Vec<DbCustomer>, DbError> {
        self.query_customers("cu.user_id = ?1 AND cu.company_id = ?2", &[&user_id, &company_id])
    }

    pub fn get_customer(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<Option<DbCustomer>, DbError> {
        Ok(self
            .query_customers("cu.user_id = ?1 AND cu.customer_id = ?2", &[&user_id, &customer_id])?
            .into_iter()
            .next())
    }

    pub fn find_customer_by_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<Option<DbCustomer>, DbError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .query_customers("cu.user_id = ?1 AND cu.email = ?2", &[&user_id, &email])?
            .into_iter()
            .next())
    }

    /// Insert a customer. Emails are unique per user (case-insensitive).
    pub fn create_customer(&self, user_id: &str, new: &NewCustomer) -> Result<DbCustomer, DbError> {
        let customer_id = new_id();
        let now = now_rfc3339();
        let email = new.email.trim().to_lowercase();
        let result = self.conn.execute(
            "INSERT INTO customers (
                customer_id, user_id, company_id, email, full_name, title,
                domain_match, status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                customer_id,
                user_id,
                new.company_id,
                email,
                new.full_name,
                new.title,
                new.domain_match,
                new.status.unwrap_or(CustomerStatus::Prospect),
                now,
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(DbError::Conflict(format!("Customer '{email}'")));
            }
            Err(e) => return Err(e.into()),
        }
        self.get_customer(user_id, &customer_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn update_customer(
        &self,
        user_id: &str,
        customer_id: &str,
        update: &CustomerUpdate,
    ) -> Result<Option<DbCustomer>, DbError> {
        let rows = self.conn.execute(
            "UPDATE customers SET
                full_name = COALESCE(?3, full_name),
                title = COALESCE(?4, title),
                company_id = COALESCE(?5, company_id),
                status = COALESCE(?6, status),
                health_score = COALESCE(?7, health_score),
                sentiment = COALESCE(?8, sentiment),
                updated_at = ?9
             WHERE user_id = ?1 AND customer_id = ?2",
            params![
                user_id,
                customer_id,
                update.full_name,
                update.title,
                update.company_id,
                update.status,
                update.health_score,
                update.sentiment,
                now_rfc3339(),
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_customer(user_id, customer_id)
    }

    /// Attach a customer to the company owning its email domain, unless it
    /// already belongs to one.
    pub fn link_customer_company(
        &self,
        customer_id: &str,
        company_id: &str,
        domain: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE customers SET company_id = ?2, domain_match = ?3, updated_at = ?4
             WHERE customer_id = ?1 AND company_id IS NULL",
            params![customer_id, company_id, domain, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_customer_sentiment(
        &self,
        customer_id: &str,
        sentiment: Option<&str>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE customers SET sentiment = ?2, updated_at = ?3 WHERE customer_id = ?1",
            params![customer_id, sentiment, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_customer(&self, user_id: &str, customer_id: &str) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "DELETE FROM customers WHERE user_id = ?1 AND customer_id = ?2",
            params![user_id, customer_id],
        )?;
        Ok(rows > 0)
    }

    /// Display name for transcripts: full name, else the address.
    pub fn customer_display_name(&self, customer_id: &str) -> Result<Option<String>, DbError> {
        let name = self
            .conn
            .query_row(
                "SELECT COALESCE(full_name, email) FROM customers WHERE customer_id = ?1",
                params![customer_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Sentiment of the most recently analysed thread the customer is on.
    pub fn latest_customer_thread_sentiment(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>, DbError> {
        let sentiment = self
            .conn
            .query_row(
                "SELECT t.sentiment FROM threads t
                 JOIN thread_participants p ON p.thread_id = t.thread_id
                 WHERE p.customer_id = ?1 AND t.sentiment IS NOT NULL
                 ORDER BY t.last_analyzed_at DESC
                 LIMIT 1",
                params![customer_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(sentiment)
    }
}
