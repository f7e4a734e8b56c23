use super::{RecallClient, RecallError};
use crate::config::RecallConfig;
use crate::db::{DbMeeting, SharedDb};
use crate::types::BotStatus;

/// Turn recording on or off for one meeting.
///
/// Enabling schedules a bot to join at the meeting's start time; disabling
/// removes it. When the provider call fails the meeting row is left as it
/// was and the error is returned.
pub async fn set_meeting_recording(
    db: &SharedDb,
    client: Option<&RecallClient>,
    config: &RecallConfig,
    user_id: &str,
    meeting_id: &str,
    enabled: bool,
) -> Result<DbMeeting, RecallError> {
    let meeting = db
        .lock()
        .get_meeting(user_id, meeting_id)?
        .ok_or_else(|| RecallError::MeetingNotFound(meeting_id.to_string()))?;
    let client = client.ok_or(RecallError::NotConfigured)?;

    if enabled {
        enable(db, client, config, &meeting).await?;
    } else {
        disable(db, client, &meeting).await?;
    }

    db.lock()
        .get_meeting(user_id, meeting_id)?
        .ok_or_else(|| RecallError::MeetingNotFound(meeting_id.to_string()))
}

async fn enable(
    db: &SharedDb,
    client: &RecallClient,
    config: &RecallConfig,
    meeting: &DbMeeting,
) -> Result<(), RecallError> {
    let meeting_url = meeting
        .meeting_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| RecallError::NoMeetingUrl(meeting.meeting_id.clone()))?;
    if meeting.bot_status.is_live() && meeting.recall_bot_id.is_some() {
        return Err(RecallError::BotAlreadyActive(meeting.meeting_id.clone()));
    }

    let bot_id = client
        .create_bot(
            meeting_url,
            Some(&meeting.start_time),
            &config.bot_name,
            config.public_webhook_url.as_deref(),
        )
        .await
        .map_err(|e| {
            log::warn!("Could not schedule bot for meeting {}: {}", meeting.meeting_id, e);
            e
        })?;

    db.lock()
        .set_meeting_bot(&meeting.meeting_id, Some(&bot_id), BotStatus::Scheduled)?;
    log::info!("Recording enabled for meeting {} (bot {})", meeting.meeting_id, bot_id);
    Ok(())
}

async fn disable(
    db: &SharedDb,
    client: &RecallClient,
    meeting: &DbMeeting,
) -> Result<(), RecallError> {
    let Some(bot_id) = meeting.recall_bot_id.as_deref() else {
        log::debug!("Meeting {} has no bot to remove", meeting.meeting_id);
        return Ok(());
    };
    if !meeting.bot_status.is_live() {
        log::debug!(
            "Bot {} for meeting {} is already {:?}",
            bot_id,
            meeting.meeting_id,
            meeting.bot_status
        );
        return Ok(());
    }

    client.delete_bot(bot_id).await.map_err(|e| {
        log::warn!("Could not remove bot {} for meeting {}: {}", bot_id, meeting.meeting_id, e);
        e
    })?;

    db.lock()
        .set_meeting_bot_status(&meeting.meeting_id, BotStatus::Cancelled)?;
    log::info!("Recording disabled for meeting {}", meeting.meeting_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::db::{shared, MeetingUpsert};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seed(meeting_url: Option<&str>) -> (SharedDb, String) {
        let db = test_db();
        let id = db
            .upsert_meeting(
                TEST_USER,
                &MeetingUpsert {
                    google_event_id: "evt-1".into(),
                    calendar_id: "primary".into(),
                    title: "Onboarding".into(),
                    start_time: "2026-03-01T15:00:00+00:00".into(),
                    meeting_url: meeting_url.map(str::to_string),
                    ..Default::default()
                },
            )
            .unwrap();
        (shared(db), id)
    }

    #[tokio::test]
    async fn test_enable_then_disable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "bot-9"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/bot/bot-9/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let client = RecallClient::new(reqwest::Client::new(), &server.uri(), "rk");
        let config = RecallConfig::default();
        let (db, id) = seed(Some("https://zoom.us/j/123"));

        let meeting = set_meeting_recording(&db, Some(&client), &config, TEST_USER, &id, true)
            .await
            .unwrap();
        assert_eq!(meeting.recall_bot_id.as_deref(), Some("bot-9"));
        assert_eq!(meeting.bot_status, BotStatus::Scheduled);

        let again = set_meeting_recording(&db, Some(&client), &config, TEST_USER, &id, true).await;
        assert!(matches!(again, Err(RecallError::BotAlreadyActive(_))));

        let meeting = set_meeting_recording(&db, Some(&client), &config, TEST_USER, &id, false)
            .await
            .unwrap();
        assert_eq!(meeting.bot_status, BotStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_row_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;
        let client = RecallClient::new(reqwest::Client::new(), &server.uri(), "rk");
        let (db, id) = seed(Some("https://zoom.us/j/123"));

        let err = set_meeting_recording(&db, Some(&client), &RecallConfig::default(), TEST_USER, &id, true)
            .await
            .unwrap_err();
        assert!(err.is_upstream());
        let meeting = db.lock().get_meeting(TEST_USER, &id).unwrap().unwrap();
        assert!(meeting.recall_bot_id.is_none());
        assert_eq!(meeting.bot_status, BotStatus::None);
    }

    #[tokio::test]
    async fn test_enable_requires_meeting_url() {
        let client = RecallClient::new(reqwest::Client::new(), "http://127.0.0.1:9", "rk");
        let (db, id) = seed(None);
        let err = set_meeting_recording(&db, Some(&client), &RecallConfig::default(), TEST_USER, &id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::NoMeetingUrl(_)));
    }
}
