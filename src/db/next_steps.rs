use std::collections::HashMap;

use rusqlite::params;

use super::*;
use crate::types::NextStepStatus;

impl Db {
    // =========================================================================
    // Next steps
    // =========================================================================

    fn query_next_steps(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DbNextStep>, DbError> {
        let sql = format!(
            "SELECT ns.step_id, ns.user_id, ns.company_id, co.company_name, ns.thread_id,
                    ns.meeting_id, ns.description, ns.owner, ns.due_date, ns.status,
                    ns.completed_at, ns.created_at, ns.updated_at
             FROM next_steps ns
             LEFT JOIN companies co ON co.company_id = ns.company_id
             WHERE {where_clause}
             ORDER BY ns.status = 'completed', ns.due_date IS NULL, ns.due_date, ns.created_at"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(DbNextStep {
                step_id: row.get(0)?,
                user_id: row.get(1)?,
                company_id: row.get(2)?,
                company_name: row.get(3)?,
                thread_id: row.get(4)?,
                meeting_id: row.get(5)?,
                description: row.get(6)?,
                owner: row.get(7)?,
                due_date: row.get(8)?,
                status: row.get(9)?,
                completed_at: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
                assignee_ids: Vec::new(),
            })
        })?;
        let mut steps = Vec::new();
        for row in rows {
            steps.push(row?);
        }
        self.attach_assignees(&mut steps)?;
        Ok(steps)
    }

    fn attach_assignees(&self, steps: &mut [DbNextStep]) -> Result<(), DbError> {
        if steps.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = steps.iter().map(|s| s.step_id.as_str()).collect();
        let sql = format!(
            "SELECT step_id, customer_id FROM next_step_assignments
             WHERE step_id IN ({}) ORDER BY customer_id",
            placeholders(1, ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut by_step: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (step_id, customer_id) = row?;
            by_step.entry(step_id).or_default().push(customer_id);
        }
        for step in steps.iter_mut() {
            step.assignee_ids = by_step.remove(&step.step_id).unwrap_or_default();
        }
        Ok(())
    }

    /// Next steps of a user, open ones first. `status` filters when given.
    pub fn list_next_steps(
        &self,
        user_id: &str,
        status: Option<NextStepStatus>,
    ) -> Result<Vec<DbNextStep>, DbError> {
        match status {
            Some(status) => {
                self.query_next_steps("ns.user_id = ?1 AND ns.status = ?2", &[&user_id, &status])
            }
            None => self.query_next_steps("ns.user_id = ?1", &[&user_id]),
        }
    }

    pub fn list_company_next_steps(
        &self,
        user_id: &str,
        company_id: &str,
    ) -> Result<Vec<DbNextStep>, DbError> {
        self.query_next_steps("ns.user_id = ?1 AND ns.company_id = ?2", &[&user_id, &company_id])
    }

    pub fn get_next_step(&self, user_id: &str, step_id: &str) -> Result<Option<DbNextStep>, DbError> {
        Ok(self
            .query_next_steps("ns.user_id = ?1 AND ns.step_id = ?2", &[&user_id, &step_id])?
            .into_iter()
            .next())
    }

    /// Descriptions already recorded for a thread or meeting.
    pub fn existing_next_step_descriptions(
        &self,
        thread_id: Option<&str>,
        meeting_id: Option<&str>,
    ) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT description FROM next_steps
             WHERE (?1 IS NOT NULL AND thread_id = ?1)
                OR (?2 IS NOT NULL AND meeting_id = ?2)",
        )?;
        let rows = stmt.query_map(params![thread_id, meeting_id], |row| row.get(0))?;
        let mut descriptions = Vec::new();
        for row in rows {
            descriptions.push(row?);
        }
        Ok(descriptions)
    }

    pub fn create_next_step(&self, user_id: &str, new: &NewNextStep) -> Result<DbNextStep, DbError> {
        let step_id = new_id();
        self.conn.execute(
            "INSERT INTO next_steps (
                step_id, user_id, company_id, thread_id, meeting_id, description,
                owner, due_date, status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                step_id,
                user_id,
                new.company_id,
                new.thread_id,
                new.meeting_id,
                new.description.trim(),
                new.owner,
                new.due_date,
                NextStepStatus::Pending,
                now_rfc3339(),
            ],
        )?;
        self.get_next_step(user_id, &step_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn assign_next_step(&self, step_id: &str, customer_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO next_step_assignments (step_id, customer_id) VALUES (?1, ?2)",
            params![step_id, customer_id],
        )?;
        Ok(())
    }

    /// Partial update. Moving to `completed` stamps `completed_at`; moving
    /// back to `pending` clears it.
    pub fn update_next_step(
        &self,
        user_id: &str,
        step_id: &str,
        update: &NextStepUpdate,
    ) -> Result<Option<DbNextStep>, DbError> {
        let now = now_rfc3339();
        let rows = self.conn.execute(
            "UPDATE next_steps SET
                description = COALESCE(?3, description),
                owner = COALESCE(?4, owner),
                due_date = COALESCE(?5, due_date),
                completed_at = CASE
                    WHEN ?6 = 'completed' AND status != 'completed' THEN ?7
                    WHEN ?6 = 'pending' THEN NULL
                    ELSE completed_at
                END,
                status = COALESCE(?6, status),
                updated_at = ?7
             WHERE user_id = ?1 AND step_id = ?2",
            params![
                user_id,
                step_id,
                update.description,
                update.owner,
                update.due_date,
                update.status,
                now,
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_next_step(user_id, step_id)
    }

    pub fn delete_next_step(&self, user_id: &str, step_id: &str) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "DELETE FROM next_steps WHERE user_id = ?1 AND step_id = ?2",
            params![user_id, step_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};

    fn step(description: &str) -> NewNextStep {
        NewNextStep {
            description: description.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_toggle_completion_round_trip() {
        let db = test_db();
        let created = db.create_next_step(TEST_USER, &step("Send pricing deck")).unwrap();
        assert_eq!(created.status, NextStepStatus::Pending);
        assert!(created.completed_at.is_none());

        let done = db
            .update_next_step(
                TEST_USER,
                &created.step_id,
                &NextStepUpdate {
                    status: Some(NextStepStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(done.status, NextStepStatus::Completed);
        assert!(done.completed_at.is_some());

        let reopened = db
            .update_next_step(
                TEST_USER,
                &created.step_id,
                &NextStepUpdate {
                    status: Some(NextStepStatus::Pending),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(reopened.status, NextStepStatus::Pending);
        assert!(reopened.completed_at.is_none());
        assert_eq!(reopened.description, "Send pricing deck");
    }

    #[test]
    fn test_status_filter_and_assignees() {
        let db = test_db();
        let a = db.create_next_step(TEST_USER, &step("A")).unwrap();
        let b = db.create_next_step(TEST_USER, &step("B")).unwrap();
        let customer = db
            .create_customer(
                TEST_USER,
                &NewCustomer {
                    email: "jane@acme.io".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        db.assign_next_step(&a.step_id, &customer.customer_id).unwrap();
        db.assign_next_step(&a.step_id, &customer.customer_id).unwrap();
        db.update_next_step(
            TEST_USER,
            &b.step_id,
            &NextStepUpdate {
                status: Some(NextStepStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();

        let pending = db.list_next_steps(TEST_USER, Some(NextStepStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].assignee_ids, vec![customer.customer_id.clone()]);
        assert_eq!(db.list_next_steps(TEST_USER, None).unwrap().len(), 2);
    }

    #[test]
    fn test_existing_descriptions_are_lowercased() {
        let db = test_db();
        db.upsert_thread(
            TEST_USER,
            &crate::db::threads::ThreadUpsert {
                thread_id: "t1".into(),
                ..Default::default()
            },
        )
        .unwrap();
        db.create_next_step(
            TEST_USER,
            &NewNextStep {
                thread_id: Some("t1".into()),
                ..step("  Schedule Kickoff ")
            },
        )
        .unwrap();
        assert_eq!(
            db.existing_next_step_descriptions(Some("t1"), None).unwrap(),
            vec!["Schedule Kickoff".to_string()]
        );
        assert!(db.existing_next_step_descriptions(None, None).unwrap().is_empty());
    }
}
