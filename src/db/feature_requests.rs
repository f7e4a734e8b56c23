use rusqlite::params;

use super::*;
use crate::types::{FeatureRequestStatus, Urgency};

impl Db {
    // =========================================================================
    // Feature requests
    // =========================================================================

    fn query_feature_requests(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DbFeatureRequest>, DbError> {
        let sql = format!(
            "SELECT fr.request_id, fr.user_id, fr.company_id, co.company_name, fr.thread_id,
                    fr.meeting_id, fr.title, fr.customer_description, fr.use_case, fr.urgency,
                    fr.urgency_signals, fr.customer_impact, fr.status, fr.created_at,
                    fr.updated_at
             FROM feature_requests fr
             LEFT JOIN companies co ON co.company_id = fr.company_id
             WHERE {where_clause}
             ORDER BY CASE fr.urgency WHEN 'High' THEN 0 WHEN 'Medium' THEN 1 ELSE 2 END,
                      fr.created_at DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(DbFeatureRequest {
                request_id: row.get(0)?,
                user_id: row.get(1)?,
                company_id: row.get(2)?,
                company_name: row.get(3)?,
                thread_id: row.get(4)?,
                meeting_id: row.get(5)?,
                title: row.get(6)?,
                customer_description: row.get(7)?,
                use_case: row.get(8)?,
                urgency: row.get(9)?,
                urgency_signals: row.get(10)?,
                customer_impact: row.get(11)?,
                status: row.get(12)?,
                created_at: row.get(13)?,
                updated_at: row.get(14)?,
            })
        })?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// Feature requests of a user, most urgent first. Filters are optional.
    pub fn list_feature_requests(
        &self,
        user_id: &str,
        status: Option<FeatureRequestStatus>,
        urgency: Option<Urgency>,
    ) -> Result<Vec<DbFeatureRequest>, DbError> {
        self.query_feature_requests(
            "fr.user_id = ?1
             AND (?2 IS NULL OR fr.status = ?2)
             AND (?3 IS NULL OR fr.urgency = ?3)",
            &[&user_id, &status, &urgency],
        )
    }

    pub fn list_company_feature_requests(
        &self,
        user_id: &str,
        company_id: &str,
    ) -> Result<Vec<DbFeatureRequest>, DbError> {
        self.query_feature_requests(
            "fr.user_id = ?1 AND fr.company_id = ?2",
            &[&user_id, &company_id],
        )
    }

    pub fn get_feature_request(
        &self,
        user_id: &str,
        request_id: &str,
    ) -> Result<Option<DbFeatureRequest>, DbError> {
        Ok(self
            .query_feature_requests(
                "fr.user_id = ?1 AND fr.request_id = ?2",
                &[&user_id, &request_id],
            )?
            .into_iter()
            .next())
    }

    /// Lowercased titles already recorded for a thread or meeting.
    pub fn existing_feature_request_titles(
        &self,
        thread_id: Option<&str>,
        meeting_id: Option<&str>,
    ) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT title FROM feature_requests
             WHERE (?1 IS NOT NULL AND thread_id = ?1)
                OR (?2 IS NOT NULL AND meeting_id = ?2)",
        )?;
        let rows = stmt.query_map(params![thread_id, meeting_id], |row| row.get(0))?;
        let mut titles = Vec::new();
        for row in rows {
            titles.push(row?);
        }
        Ok(titles)
    }

    pub fn create_feature_request(
        &self,
        user_id: &str,
        new: &NewFeatureRequest,
    ) -> Result<String, DbError> {
        let request_id = new_id();
        self.conn.execute(
            "INSERT INTO feature_requests (
                request_id, user_id, company_id, thread_id, meeting_id, title,
                customer_description, use_case, urgency, urgency_signals,
                customer_impact, status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                request_id,
                user_id,
                new.company_id,
                new.thread_id,
                new.meeting_id,
                new.title.trim(),
                new.customer_description,
                new.use_case,
                new.urgency,
                new.urgency_signals,
                new.customer_impact,
                FeatureRequestStatus::New,
                now_rfc3339(),
            ],
        )?;
        Ok(request_id)
    }

    pub fn update_feature_request(
        &self,
        user_id: &str,
        request_id: &str,
        update: &FeatureRequestUpdate,
    ) -> Result<Option<DbFeatureRequest>, DbError> {
        let rows = self.conn.execute(
            "UPDATE feature_requests SET
                title = COALESCE(?3, title),
                customer_description = COALESCE(?4, customer_description),
                urgency = COALESCE(?5, urgency),
                status = COALESCE(?6, status),
                updated_at = ?7
             WHERE user_id = ?1 AND request_id = ?2",
            params![
                user_id,
                request_id,
                update.title,
                update.customer_description,
                update.urgency,
                update.status,
                now_rfc3339(),
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_feature_request(user_id, request_id)
    }

    pub fn delete_feature_request(&self, user_id: &str, request_id: &str) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "DELETE FROM feature_requests WHERE user_id = ?1 AND request_id = ?2",
            params![user_id, request_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};

    fn request(title: &str, urgency: Urgency) -> NewFeatureRequest {
        NewFeatureRequest {
            company_id: None,
            thread_id: None,
            meeting_id: None,
            title: title.to_string(),
            customer_description: None,
            use_case: None,
            urgency,
            urgency_signals: None,
            customer_impact: None,
        }
    }

    #[test]
    fn test_list_orders_by_urgency_and_filters() {
        let db = test_db();
        db.create_feature_request(TEST_USER, &request("SSO", Urgency::Low)).unwrap();
        db.create_feature_request(TEST_USER, &request("Audit log", Urgency::High))
            .unwrap();

        let all = db.list_feature_requests(TEST_USER, None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Audit log");

        let high = db
            .list_feature_requests(TEST_USER, None, Some(Urgency::High))
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].status, FeatureRequestStatus::New);
    }

    #[test]
    fn test_update_status() {
        let db = test_db();
        let id = db.create_feature_request(TEST_USER, &request("SSO", Urgency::Medium)).unwrap();
        let updated = db
            .update_feature_request(
                TEST_USER,
                &id,
                &FeatureRequestUpdate {
                    status: Some(FeatureRequestStatus::Planned),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, FeatureRequestStatus::Planned);
        assert_eq!(updated.urgency, Urgency::Medium);
        assert!(db
            .list_feature_requests(TEST_USER, Some(FeatureRequestStatus::New), None)
            .unwrap()
            .is_empty());
    }
}
