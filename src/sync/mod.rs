//! Background Gmail + Calendar sync.
//!
//! A sync job is a row in `sync_jobs`. `start_sync` inserts it (one active
//! job per user) and spawns `run_sync_job`, which walks the job through
//! `running` to `completed` or `failed` while publishing progress:
//! Gmail import 0-60, Calendar import 60-90, entity resolution 90-100.
//!
//! Modules:
//! - calendar_import: events with external attendees -> meetings
//! - gmail_import: threads and messages -> threads/emails
//! - poller: optional auto-sync loop
//! - status: client-side job tracker

pub mod calendar_import;
pub mod gmail_import;
pub mod poller;
pub mod status;

use serde::Serialize;

use crate::config::GoogleConfig;
use crate::db::{Db, DbError, DbSyncJob, SharedDb};
use crate::google_api::{get_valid_access_token, GoogleApiError, GoogleClient};
use crate::processor::{resolve_thread_entities, AnalysisQueue, ResolutionReport};
use crate::types::{ProcessingStage, SyncJobKind};

pub use poller::run_auto_sync;
pub use status::{SyncPhase, SyncStatus};

pub const GMAIL_PROGRESS_END: i64 = 60;
pub const CALENDAR_PROGRESS_END: i64 = 90;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Database: {0}")]
    Db(#[from] DbError),
    #[error("Google: {0}")]
    Google(#[from] GoogleApiError),
    #[error("A sync job is already running")]
    AlreadyRunning(Box<DbSyncJob>),
}

/// Everything a sync job needs. Cheap to clone.
#[derive(Clone)]
pub struct SyncContext {
    pub db: SharedDb,
    pub google: GoogleClient,
    pub google_config: GoogleConfig,
    pub queue: AnalysisQueue,
}

/// Counts recorded on a finished job.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub threads_synced: usize,
    pub messages_inserted: usize,
    pub meetings_synced: usize,
    pub resolution: Option<ResolutionReport>,
}

/// Insert a `pending` job unless the user already has an active one.
///
/// The check and the insert share one `BEGIN IMMEDIATE` transaction, so two
/// concurrent callers cannot both insert.
pub fn create_sync_job(db: &Db, user_id: &str, kind: SyncJobKind) -> Result<DbSyncJob, SyncError> {
    db.with_transaction(|db| -> Result<DbSyncJob, SyncError> {
        if let Some(active) = db.active_sync_job(user_id)? {
            return Err(SyncError::AlreadyRunning(Box::new(active)));
        }
        Ok(db.insert_sync_job(user_id, kind)?)
    })
}

/// Create a job and run it on a spawned task.
pub fn start_sync(ctx: &SyncContext, user_id: &str, kind: SyncJobKind) -> Result<DbSyncJob, SyncError> {
    let job = create_sync_job(&ctx.db.lock(), user_id, kind)?;
    log::info!("Sync job {} ({:?}) created for {}", job.job_id, kind, user_id);

    let ctx = ctx.clone();
    let spawned = job.clone();
    tokio::spawn(async move {
        let _ = run_sync_job(&ctx, &spawned).await;
    });
    Ok(job)
}

/// Run a created job to completion, recording the outcome on the row.
pub async fn run_sync_job(ctx: &SyncContext, job: &DbSyncJob) -> Result<SyncSummary, SyncError> {
    ctx.db.lock().mark_sync_job_running(&job.job_id)?;
    log::info!("Sync job {} running for {}", job.job_id, job.user_id);

    match execute(ctx, job).await {
        Ok(summary) => {
            ctx.db.lock().complete_sync_job(
                &job.job_id,
                summary.threads_synced as i64,
                summary.meetings_synced as i64,
            )?;
            log::info!(
                "Sync job {} completed: {} thread(s), {} meeting(s)",
                job.job_id,
                summary.threads_synced,
                summary.meetings_synced
            );
            Ok(summary)
        }
        Err(e) => {
            log::error!("Sync job {} failed: {}", job.job_id, e);
            if let Err(db_err) = ctx.db.lock().fail_sync_job(&job.job_id, &e.to_string()) {
                log::error!("Could not record failure of job {}: {}", job.job_id, db_err);
            }
            Err(e)
        }
    }
}

async fn execute(ctx: &SyncContext, job: &DbSyncJob) -> Result<SyncSummary, SyncError> {
    let access_token = get_valid_access_token(
        &ctx.db,
        ctx.google.http(),
        &job.user_id,
        ctx.google_config.client_secret.as_deref(),
    )
    .await?;

    let mut summary = SyncSummary::default();
    let mut touched = Vec::new();

    if job.kind.includes_gmail() {
        let imported = gmail_import::import_gmail(ctx, &job.user_id, &access_token, &job.job_id).await?;
        summary.threads_synced = imported.threads_synced;
        summary.messages_inserted = imported.messages_inserted;
        touched = imported.touched_threads;
    }
    set_progress(&ctx.db, &job.job_id, GMAIL_PROGRESS_END);

    if job.kind.includes_calendar() {
        summary.meetings_synced =
            calendar_import::import_calendar(ctx, &job.user_id, &access_token).await?;
    }
    set_progress(&ctx.db, &job.job_id, CALENDAR_PROGRESS_END);

    if job.kind.includes_gmail() {
        // Threads left pending by an earlier run (e.g. a full queue) go too.
        let pending = ctx
            .db
            .lock()
            .list_threads_in_stage(&job.user_id, ProcessingStage::Pending)?;
        for thread in pending {
            if !touched.contains(&thread.thread_id) {
                touched.push(thread.thread_id);
            }
        }
        if !touched.is_empty() {
            let report = resolve_thread_entities(&ctx.db, &ctx.queue, &job.user_id, &touched);
            for error in &report.errors {
                log::warn!("Sync job {}: {}", job.job_id, error);
            }
            summary.resolution = Some(report);
        }
    }

    Ok(summary)
}

/// Best-effort progress update.
pub(crate) fn set_progress(db: &SharedDb, job_id: &str, progress: i64) {
    if let Err(e) = db.lock().set_sync_job_progress(job_id, progress) {
        log::warn!("Could not update progress of job {}: {}", job_id, e);
    }
}
