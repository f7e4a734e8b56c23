use axum::response::{IntoResponse, Response};
use serde_json::Value;

use super::*;

use crate::db::DbSyncJob;
use crate::recall::webhook::{handle_webhook, WebhookOutcome};
use crate::sync::{start_sync, SyncError};
use crate::types::SyncJobKind;

#[derive(Debug, Deserialize)]
pub(super) struct SyncQuery {
    kind: Option<String>,
}

/// Start a sync job: 201 with the new job, or 409 with the job already
/// running for this user.
pub(super) async fn start(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Query(query): Query<SyncQuery>,
) -> Result<Response, ApiError> {
    let kind = parse_filter(query.kind.as_deref(), "kind", SyncJobKind::parse)?
        .unwrap_or(SyncJobKind::Full);
    match start_sync(&state.sync_context(), &user, kind) {
        Ok(job) => Ok((StatusCode::CREATED, Json(job)).into_response()),
        Err(SyncError::AlreadyRunning(active)) => {
            log::info!("Sync for {} refused: job {} is active", user, active.job_id);
            Ok((StatusCode::CONFLICT, Json(*active)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Most recent job, or `null` when the user never synced.
pub(super) async fn latest(
    State(state): State<SharedState>,
    UserId(user): UserId,
) -> Result<Json<Option<DbSyncJob>>, ApiError> {
    Ok(Json(state.db.lock().latest_sync_job(&user)?))
}

pub(super) async fn get_job(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<DbSyncJob>, ApiError> {
    state
        .db
        .lock()
        .get_sync_job(&user, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Sync job", &id))
}

#[derive(Debug, Deserialize)]
pub(super) struct WebhookQuery {
    token: Option<String>,
}

/// Bot status callbacks. Authenticated by the shared `?token=`, not by user.
pub(super) async fn recall_webhook(
    State(state): State<SharedState>,
    Query(query): Query<WebhookQuery>,
    Json(payload): Json<Value>,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let outcome = handle_webhook(
        &state.db,
        state.recall.as_ref(),
        state.llm.as_ref(),
        state.config.recall.webhook_token.as_deref(),
        query.token.as_deref(),
        &payload,
    )
    .await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Method;
    use serde_json::json;

    use super::super::tests::{send, send_as, test_app};
    use super::*;
    use crate::config::Config;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::db::MeetingUpsert;
    use crate::state::AppState;
    use crate::types::{BotStatus, SyncJobStatus};

    #[tokio::test]
    async fn test_second_sync_conflicts_with_active_job() {
        let (app, state) = test_app();
        let active = state
            .db
            .lock()
            .insert_sync_job(TEST_USER, SyncJobKind::Full)
            .unwrap();

        let (status, body) = send(&app, Method::POST, "/api/sync", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["jobId"], active.job_id.as_str());
        assert_eq!(body["status"], "pending");

        let (status, latest) = send(&app, Method::GET, "/api/sync/latest", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["jobId"], active.job_id.as_str());
    }

    #[tokio::test]
    async fn test_sync_creates_job_and_records_failure() {
        let (app, _) = test_app();
        let (_, none) = send(&app, Method::GET, "/api/sync/latest", None).await;
        assert!(none.is_null());

        let (status, job) = send(&app, Method::POST, "/api/sync?kind=gmail", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["kind"], "gmail");
        assert_eq!(job["status"], "pending");

        // No Google token is stored, so the spawned run fails the job.
        let uri = format!("/api/sync/{}", job["jobId"].as_str().unwrap());
        let mut last = Value::Null;
        for _ in 0..50 {
            let (_, row) = send(&app, Method::GET, &uri, None).await;
            last = row;
            if last["status"] == SyncJobStatus::Failed.as_str() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(last["status"], "failed");
        assert!(last["error"].as_str().unwrap().contains(TEST_USER));

        let (status, _) = send(&app, Method::POST, "/api/sync?kind=everything", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::GET, "/api/sync/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recall_webhook_checks_token() {
        let mut config = Config::default();
        config.recall.webhook_token = Some("s3cret".into());
        let (state, _rx) = AppState::new(test_db(), config);
        let state = Arc::new(state);
        let app = build_router(state.clone());
        let meeting_id = {
            let db = state.db.lock();
            let id = db
                .upsert_meeting(
                    TEST_USER,
                    &MeetingUpsert {
                        google_event_id: "evt-1".into(),
                        calendar_id: "primary".into(),
                        title: "Acme QBR".into(),
                        start_time: "2026-03-01T15:00:00+00:00".into(),
                        ..Default::default()
                    },
                )
                .unwrap();
            db.set_meeting_bot(&id, Some("bot-1"), BotStatus::Scheduled)
                .unwrap();
            id
        };
        let payload = json!({"event": "bot.status_change", "data": {"bot_id": "bot-1", "status": {"code": "in_call_recording"}}});

        let (status, _) = send_as(
            &app,
            None,
            Method::POST,
            "/api/webhooks/recall?token=wrong",
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send_as(
            &app,
            None,
            Method::POST,
            "/api/webhooks/recall?token=s3cret",
            Some(payload),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meetingId"], meeting_id.as_str());
        assert_eq!(body["botStatus"], "recording");
    }
}
