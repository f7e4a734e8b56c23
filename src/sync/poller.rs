//! Auto-sync loop.
//!
//! Every `autoSyncIntervalMinutes`, or sooner when woken through the
//! `Notify`, each user with a stored Google token gets a sync job unless
//! one is already active.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use super::{create_sync_job, run_sync_job, SyncContext, SyncError};
use crate::config::SyncConfig;
use crate::google_api::PROVIDER;
use crate::types::SyncJobKind;

/// Background loop. Returns immediately when auto-sync is disabled.
pub async fn run_auto_sync(ctx: SyncContext, config: SyncConfig, wake: Arc<Notify>) {
    if !config.auto_sync_enabled {
        log::info!("Auto-sync disabled");
        return;
    }
    let interval = Duration::from_secs(config.auto_sync_interval_minutes.max(1) * 60);
    log::info!("Auto-sync: started, every {:?}", interval);

    loop {
        tokio::select! {
            _ = wake.notified() => {
                log::debug!("Auto-sync: woken");
            }
            _ = tokio::time::sleep(interval) => {
                log::debug!("Auto-sync: periodic run");
            }
        }

        let ran = poll_once(&ctx).await;
        if ran > 0 {
            log::info!("Auto-sync: ran {} job(s)", ran);
        }
    }
}

/// One pass over every connected user. Returns the number of jobs run.
pub(crate) async fn poll_once(ctx: &SyncContext) -> usize {
    let users = match ctx.db.lock().list_users_with_token(PROVIDER) {
        Ok(users) => users,
        Err(e) => {
            log::warn!("Auto-sync: could not list users: {}", e);
            return 0;
        }
    };

    let mut ran = 0;
    for user_id in users {
        let created = create_sync_job(&ctx.db.lock(), &user_id, SyncJobKind::Full);
        let job = match created {
            Ok(job) => job,
            Err(SyncError::AlreadyRunning(active)) => {
                log::debug!("Auto-sync: {} already has job {}", user_id, active.job_id);
                continue;
            }
            Err(e) => {
                log::warn!("Auto-sync: could not create job for {}: {}", user_id, e);
                continue;
            }
        };
        // Failures are recorded on the job row.
        let _ = run_sync_job(ctx, &job).await;
        ran += 1;
    }
    ran
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::shared;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::google_api::token_store::save_token;
    use crate::sync::tests::{context, fresh_token};
    use crate::types::SyncJobStatus;
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_users_with_active_jobs_are_skipped() {
        let server = MockServer::start().await;
        let db = test_db();
        save_token(&db, TEST_USER, &fresh_token()).unwrap();
        let active = db.insert_sync_job(TEST_USER, SyncJobKind::Full).unwrap();
        let (ctx, _rx) = context(shared(db), &server);

        assert_eq!(poll_once(&ctx).await, 0);
        let latest = ctx.db.lock().latest_sync_job(TEST_USER).unwrap().unwrap();
        assert_eq!(latest.job_id, active.job_id);
        assert_eq!(latest.status, SyncJobStatus::Pending);
    }

    #[tokio::test]
    async fn test_disabled_poller_returns() {
        let server = MockServer::start().await;
        let (ctx, _rx) = context(shared(test_db()), &server);
        run_auto_sync(ctx, SyncConfig::default(), Arc::new(Notify::new())).await;
    }
}
