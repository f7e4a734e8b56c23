use rusqlite::params;

use super::*;

impl Db {
    // =========================================================================
    // Domain blocklist
    // =========================================================================

    pub fn list_blocked_domains(&self, user_id: &str) -> Result<Vec<DbBlockedDomain>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, user_id, domain, created_at FROM domain_blocklist
             WHERE user_id = ?1 ORDER BY domain",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(DbBlockedDomain {
                entry_id: row.get(0)?,
                user_id: row.get(1)?,
                domain: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Lowercased blocked domains, for membership checks.
    pub fn blocked_domain_set(
        &self,
        user_id: &str,
    ) -> Result<std::collections::HashSet<String>, DbError> {
        Ok(self
            .list_blocked_domains(user_id)?
            .into_iter()
            .map(|e| e.domain)
            .collect())
    }

    pub fn add_blocked_domain(&self, user_id: &str, domain: &str) -> Result<DbBlockedDomain, DbError> {
        let domain = domain.trim().trim_start_matches('@').to_lowercase();
        let entry = DbBlockedDomain {
            entry_id: new_id(),
            user_id: user_id.to_string(),
            domain,
            created_at: now_rfc3339(),
        };
        let result = self.conn.execute(
            "INSERT INTO domain_blocklist (entry_id, user_id, domain, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.entry_id, entry.user_id, entry.domain, entry.created_at],
        );
        match result {
            Ok(_) => Ok(entry),
            Err(e) if is_unique_violation(&e) => {
                Err(DbError::Conflict(format!("Blocked domain '{}'", entry.domain)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove_blocked_domain(&self, user_id: &str, entry_id: &str) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "DELETE FROM domain_blocklist WHERE user_id = ?1 AND entry_id = ?2",
            params![user_id, entry_id],
        )?;
        Ok(rows > 0)
    }
}
