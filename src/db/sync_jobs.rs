use rusqlite::params;

use super::*;
use crate::types::{SyncJobKind, SyncJobStatus};

const SYNC_JOB_COLUMNS: &str = "job_id, user_id, kind, status, progress, threads_synced,
    meetings_synced, error, created_at, started_at, completed_at";

impl Db {
    // =========================================================================
    // Sync jobs
    // =========================================================================

    fn query_sync_jobs(
        &self,
        sql_tail: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DbSyncJob>, DbError> {
        let sql = format!("SELECT {SYNC_JOB_COLUMNS} FROM sync_jobs {sql_tail}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(DbSyncJob {
                job_id: row.get(0)?,
                user_id: row.get(1)?,
                kind: row.get(2)?,
                status: row.get(3)?,
                progress: row.get(4)?,
                threads_synced: row.get(5)?,
                meetings_synced: row.get(6)?,
                error: row.get(7)?,
                created_at: row.get(8)?,
                started_at: row.get(9)?,
                completed_at: row.get(10)?,
            })
        })?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    pub fn get_sync_job(&self, user_id: &str, job_id: &str) -> Result<Option<DbSyncJob>, DbError> {
        Ok(self
            .query_sync_jobs("WHERE user_id = ?1 AND job_id = ?2", &[&user_id, &job_id])?
            .into_iter()
            .next())
    }

    pub fn latest_sync_job(&self, user_id: &str) -> Result<Option<DbSyncJob>, DbError> {
        Ok(self
            .query_sync_jobs(
                "WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                &[&user_id],
            )?
            .into_iter()
            .next())
    }

    /// The user's `pending` or `running` job, if any.
    pub fn active_sync_job(&self, user_id: &str) -> Result<Option<DbSyncJob>, DbError> {
        Ok(self
            .query_sync_jobs(
                "WHERE user_id = ?1 AND status IN ('pending', 'running')
                 ORDER BY created_at DESC LIMIT 1",
                &[&user_id],
            )?
            .into_iter()
            .next())
    }

    /// Insert a `pending` job. Callers enforce the one-active-job rule.
    pub fn insert_sync_job(&self, user_id: &str, kind: SyncJobKind) -> Result<DbSyncJob, DbError> {
        let job_id = new_id();
        self.conn.execute(
            "INSERT INTO sync_jobs (job_id, user_id, kind, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job_id, user_id, kind, SyncJobStatus::Pending, now_rfc3339()],
        )?;
        self.get_sync_job(user_id, &job_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn mark_sync_job_running(&self, job_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE sync_jobs SET status = ?2, started_at = ?3, progress = 0 WHERE job_id = ?1",
            params![job_id, SyncJobStatus::Running, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_sync_job_progress(&self, job_id: &str, progress: i64) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE sync_jobs SET progress = ?2 WHERE job_id = ?1",
            params![job_id, progress.clamp(0, 100)],
        )?;
        Ok(())
    }

    pub fn complete_sync_job(
        &self,
        job_id: &str,
        threads_synced: i64,
        meetings_synced: i64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE sync_jobs SET
                status = ?2, progress = 100, threads_synced = ?3, meetings_synced = ?4,
                error = NULL, completed_at = ?5
             WHERE job_id = ?1",
            params![
                job_id,
                SyncJobStatus::Completed,
                threads_synced,
                meetings_synced,
                now_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn fail_sync_job(&self, job_id: &str, error: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE sync_jobs SET status = ?2, error = ?3, completed_at = ?4 WHERE job_id = ?1",
            params![job_id, SyncJobStatus::Failed, error, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Fail every job left `pending`/`running` by a previous process.
    /// Returns the number of jobs touched.
    pub fn fail_interrupted_sync_jobs(&self) -> Result<usize, DbError> {
        let rows = self.conn.execute(
            "UPDATE sync_jobs SET status = 'failed', error = 'interrupted', completed_at = ?1
             WHERE status IN ('pending', 'running')",
            params![now_rfc3339()],
        )?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};

    #[test]
    fn test_job_lifecycle() {
        let db = test_db();
        let job = db.insert_sync_job(TEST_USER, SyncJobKind::Full).unwrap();
        assert_eq!(job.status, SyncJobStatus::Pending);
        assert_eq!(
            db.active_sync_job(TEST_USER).unwrap().map(|j| j.job_id),
            Some(job.job_id.clone())
        );

        db.mark_sync_job_running(&job.job_id).unwrap();
        db.set_sync_job_progress(&job.job_id, 140).unwrap();
        assert_eq!(db.get_sync_job(TEST_USER, &job.job_id).unwrap().unwrap().progress, 100);

        db.complete_sync_job(&job.job_id, 12, 3).unwrap();
        let done = db.latest_sync_job(TEST_USER).unwrap().unwrap();
        assert_eq!(done.status, SyncJobStatus::Completed);
        assert_eq!(done.threads_synced, 12);
        assert!(db.active_sync_job(TEST_USER).unwrap().is_none());
    }

    #[test]
    fn test_interrupted_jobs_fail_on_startup() {
        let db = test_db();
        let job = db.insert_sync_job(TEST_USER, SyncJobKind::Gmail).unwrap();
        db.mark_sync_job_running(&job.job_id).unwrap();
        assert_eq!(db.fail_interrupted_sync_jobs().unwrap(), 1);

        let failed = db.get_sync_job(TEST_USER, &job.job_id).unwrap().unwrap();
        assert_eq!(failed.status, SyncJobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("interrupted"));
    }

    #[test]
    fn test_jobs_are_scoped_by_user() {
        let db = test_db();
        let job = db.insert_sync_job(TEST_USER, SyncJobKind::Full).unwrap();
        assert!(db.get_sync_job("user-2", &job.job_id).unwrap().is_none());
        assert!(db.latest_sync_job("user-2").unwrap().is_none());
    }
}
