//! Bot status callbacks.
//!
//! Recall posts `bot.status_change` events in two shapes:
//! `{"data": {"bot_id": "..", "status": {"code": ".."}}}` and
//! `{"data": {"bot": {"id": ".."}, "data": {"code": ".."}}}`. Both are read.

use serde::Serialize;
use serde_json::Value;
use subtle::ConstantTimeEq;

use super::{RecallClient, RecallError};
use crate::db::SharedDb;
use crate::intelligence::SharedLlm;
use crate::processor::analyze_meeting;
use crate::types::BotStatus;

/// A status change for one bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecallEvent {
    pub bot_id: String,
    pub code: String,
}

impl RecallEvent {
    pub fn from_value(payload: &Value) -> Option<Self> {
        let data = payload.get("data").unwrap_or(payload);
        let bot_id = data
            .get("bot_id")
            .and_then(Value::as_str)
            .or_else(|| data.pointer("/bot/id").and_then(Value::as_str))?;
        let code = data
            .pointer("/status/code")
            .and_then(Value::as_str)
            .or_else(|| data.pointer("/data/code").and_then(Value::as_str))?;
        Some(Self {
            bot_id: bot_id.to_string(),
            code: code.to_string(),
        })
    }
}

/// Bot status for a Recall status code. Codes without a counterpart are
/// ignored.
pub fn bot_status_for_code(code: &str) -> Option<BotStatus> {
    match code {
        "joining_call" | "in_waiting_room" => Some(BotStatus::Scheduled),
        "in_call_recording" => Some(BotStatus::Recording),
        "call_ended" | "recording_done" => Some(BotStatus::Processing),
        "done" => Some(BotStatus::Completed),
        "fatal" => Some(BotStatus::Failed),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub meeting_id: Option<String>,
    pub bot_status: Option<BotStatus>,
    pub transcript_stored: bool,
    pub analyzed: bool,
}

/// Apply one webhook call. `expected_token` is the configured secret; calls
/// are refused when none is configured.
pub async fn handle_webhook(
    db: &SharedDb,
    client: Option<&RecallClient>,
    llm: Option<&SharedLlm>,
    expected_token: Option<&str>,
    token: Option<&str>,
    payload: &Value,
) -> Result<WebhookOutcome, RecallError> {
    match (expected_token, token) {
        (Some(expected), Some(given))
            if !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(given.as_bytes())) => {}
        _ => return Err(RecallError::InvalidToken),
    }
    let event = RecallEvent::from_value(payload).ok_or(RecallError::InvalidPayload)?;

    let Some(meeting) = db.lock().find_meeting_by_bot(&event.bot_id)? else {
        log::info!("Recall webhook for unknown bot {}, ignoring", event.bot_id);
        return Ok(WebhookOutcome::default());
    };
    let Some(status) = bot_status_for_code(&event.code) else {
        log::debug!("Recall status '{}' for bot {} ignored", event.code, event.bot_id);
        return Ok(WebhookOutcome {
            meeting_id: Some(meeting.meeting_id),
            ..Default::default()
        });
    };

    let mut outcome = WebhookOutcome {
        meeting_id: Some(meeting.meeting_id.clone()),
        bot_status: Some(status),
        ..Default::default()
    };

    if status != BotStatus::Completed {
        db.lock().set_meeting_bot_status(&meeting.meeting_id, status)?;
        log::info!("Meeting {} bot is now {:?}", meeting.meeting_id, status);
        return Ok(outcome);
    }

    let client = client.ok_or(RecallError::NotConfigured)?;
    let transcript = match client.fetch_transcript(&event.bot_id).await {
        Ok(transcript) => transcript,
        Err(e) => {
            log::warn!("Transcript fetch failed for bot {}: {}", event.bot_id, e);
            db.lock()
                .set_meeting_bot_status(&meeting.meeting_id, BotStatus::Failed)?;
            return Err(e);
        }
    };
    {
        let db = db.lock();
        db.set_meeting_transcript(&meeting.meeting_id, &transcript)?;
        db.set_meeting_bot_status(&meeting.meeting_id, BotStatus::Completed)?;
    }
    outcome.transcript_stored = true;

    match llm {
        Some(llm) if !transcript.trim().is_empty() => {
            match analyze_meeting(db, llm.as_ref(), &meeting.user_id, &meeting.meeting_id).await {
                Ok(_) => outcome.analyzed = true,
                Err(e) => log::warn!("Meeting analysis failed for {}: {}", meeting.meeting_id, e),
            }
        }
        Some(_) => log::info!("Empty transcript for meeting {}, not analysing", meeting.meeting_id),
        None => log::warn!("No LLM provider configured, meeting {} not analysed", meeting.meeting_id),
    }
    Ok(outcome)
}
