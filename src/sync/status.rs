//! Client-side view of one sync run.
//!
//! Phases only move `idle -> creating_job -> syncing -> completed | failed`.
//! A finished tracker may begin again; one in progress may not.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::db::DbSyncJob;
use crate::types::SyncJobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    CreatingJob,
    Syncing,
    Completed,
    Failed,
}

impl SyncPhase {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::CreatingJob | Self::Syncing)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SyncStatusError {
    #[error("A sync is already in progress")]
    InProgress,
    #[error("Cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: SyncPhase, to: SyncPhase },
    #[error("Job fetch failed: {0}")]
    Fetch(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub job_id: Option<String>,
    pub progress: i64,
    pub error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            job_id: None,
            progress: 0,
            error: None,
        }
    }
}

impl SyncStatus {
    pub fn is_in_progress(&self) -> bool {
        self.phase.is_in_progress()
    }

    /// Start a new run.
    pub fn begin(&mut self) -> Result<(), SyncStatusError> {
        if self.is_in_progress() {
            return Err(SyncStatusError::InProgress);
        }
        *self = Self {
            phase: SyncPhase::CreatingJob,
            ..Self::default()
        };
        Ok(())
    }

    pub fn job_created(&mut self, job: &DbSyncJob) -> Result<(), SyncStatusError> {
        self.transition(SyncPhase::CreatingJob, SyncPhase::Syncing)?;
        self.job_id = Some(job.job_id.clone());
        self.progress = job.progress;
        Ok(())
    }

    /// Job creation was refused or errored.
    pub fn create_failed(&mut self, error: &str) -> Result<(), SyncStatusError> {
        self.transition(SyncPhase::CreatingJob, SyncPhase::Failed)?;
        self.error = Some(error.to_string());
        Ok(())
    }

    /// Apply a fetched job row. Progress follows the latest row.
    pub fn apply(&mut self, job: &DbSyncJob) -> Result<(), SyncStatusError> {
        if self.phase != SyncPhase::Syncing {
            return Err(SyncStatusError::InvalidTransition {
                from: self.phase,
                to: SyncPhase::Syncing,
            });
        }
        self.progress = job.progress;
        match job.status {
            SyncJobStatus::Completed => {
                self.phase = SyncPhase::Completed;
                self.progress = 100;
            }
            SyncJobStatus::Failed => {
                self.phase = SyncPhase::Failed;
                self.error = Some(job.error.clone().unwrap_or_else(|| "sync failed".to_string()));
            }
            SyncJobStatus::Pending | SyncJobStatus::Running => {}
        }
        Ok(())
    }

    /// Fetch the job every `interval` until it leaves `pending|running`.
    pub async fn poll_until_done<F, Fut, E>(
        &mut self,
        interval: Duration,
        mut fetch: F,
    ) -> Result<SyncPhase, SyncStatusError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<DbSyncJob, E>>,
        E: std::fmt::Display,
    {
        loop {
            let job = match fetch().await {
                Ok(job) => job,
                Err(e) => {
                    self.phase = SyncPhase::Failed;
                    self.error = Some(e.to_string());
                    return Err(SyncStatusError::Fetch(e.to_string()));
                }
            };
            self.apply(&job)?;
            if !self.is_in_progress() {
                return Ok(self.phase);
            }
            tokio::time::sleep(interval).await;
        }
    }

    fn transition(&mut self, from: SyncPhase, to: SyncPhase) -> Result<(), SyncStatusError> {
        if self.phase != from {
            return Err(SyncStatusError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::types::SyncJobKind;

    fn job(status: SyncJobStatus, progress: i64) -> DbSyncJob {
        DbSyncJob {
            job_id: "job-1".into(),
            user_id: "user-1".into(),
            kind: SyncJobKind::Full,
            status,
            progress,
            threads_synced: 0,
            meetings_synced: 0,
            error: (status == SyncJobStatus::Failed).then(|| "token revoked".to_string()),
            created_at: "2026-03-01T00:00:00+00:00".into(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_second_begin_is_rejected_while_in_progress() {
        let mut status = SyncStatus::default();
        status.begin().unwrap();
        assert_eq!(status.begin(), Err(SyncStatusError::InProgress));
        status.job_created(&job(SyncJobStatus::Pending, 0)).unwrap();
        assert_eq!(status.begin(), Err(SyncStatusError::InProgress));
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let mut status = SyncStatus::default();
        assert!(matches!(
            status.job_created(&job(SyncJobStatus::Pending, 0)),
            Err(SyncStatusError::InvalidTransition { from: SyncPhase::Idle, .. })
        ));
        assert!(status.apply(&job(SyncJobStatus::Completed, 100)).is_err());
        assert_eq!(status.phase, SyncPhase::Idle);
    }

    #[test]
    fn test_failed_creation_allows_retry() {
        let mut status = SyncStatus::default();
        status.begin().unwrap();
        status.create_failed("A sync job is already running").unwrap();
        assert_eq!(status.phase, SyncPhase::Failed);
        status.begin().unwrap();
        assert_eq!(status.phase, SyncPhase::CreatingJob);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_poll_until_done_tracks_progress() {
        let mut status = SyncStatus::default();
        status.begin().unwrap();
        status.job_created(&job(SyncJobStatus::Pending, 0)).unwrap();

        let mut rows = VecDeque::from([
            job(SyncJobStatus::Running, 30),
            job(SyncJobStatus::Running, 75),
            job(SyncJobStatus::Completed, 100),
        ]);
        let mut seen = Vec::new();
        let phase = status
            .poll_until_done(Duration::from_millis(1), || {
                let next = rows.pop_front();
                if let Some(j) = &next {
                    seen.push(j.progress);
                }
                async move { next.ok_or("no more rows") }
            })
            .await
            .unwrap();
        assert_eq!(phase, SyncPhase::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(seen, vec![30, 75, 100]);
    }

    #[tokio::test]
    async fn test_poll_until_done_reports_job_failure() {
        let mut status = SyncStatus::default();
        status.begin().unwrap();
        status.job_created(&job(SyncJobStatus::Pending, 0)).unwrap();

        let phase = status
            .poll_until_done(Duration::from_millis(1), || async {
                Ok::<_, String>(job(SyncJobStatus::Failed, 40))
            })
            .await
            .unwrap();
        assert_eq!(phase, SyncPhase::Failed);
        assert_eq!(status.error.as_deref(), Some("token revoked"));
    }
}
