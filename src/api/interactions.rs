use serde::Serialize;

use super::*;

use crate::db::{DbCustomer, DbEmail, DbMeeting, DbThread};
use crate::recall::recording::set_meeting_recording;

/// A thread with its messages (oldest first) and resolved participants.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ThreadDetail {
    #[serde(flatten)]
    thread: DbThread,
    messages: Vec<DbEmail>,
    participants: Vec<DbCustomer>,
    company_ids: Vec<String>,
}

pub(super) async fn get_thread(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<ThreadDetail>, ApiError> {
    let db = state.db.lock();
    let thread = db
        .get_thread(&user, &id)?
        .ok_or_else(|| ApiError::not_found("Thread", &id))?;
    Ok(Json(ThreadDetail {
        messages: db.list_thread_emails(&id)?,
        participants: db.list_thread_participants(&id)?,
        company_ids: db.get_thread_company_ids(&id)?,
        thread,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct MeetingQuery {
    #[serde(default)]
    upcoming: bool,
}

pub(super) async fn list_meetings(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Query(query): Query<MeetingQuery>,
) -> Result<Json<Vec<DbMeeting>>, ApiError> {
    Ok(Json(state.db.lock().list_meetings(&user, query.upcoming)?))
}

pub(super) async fn get_meeting(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<DbMeeting>, ApiError> {
    state
        .db
        .lock()
        .get_meeting(&user, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Meeting", &id))
}

#[derive(Debug, Deserialize)]
pub(super) struct RecordingRequest {
    enabled: bool,
}

/// Schedule or cancel the recording bot for one meeting.
pub(super) async fn set_recording(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(request): Json<RecordingRequest>,
) -> Result<Json<DbMeeting>, ApiError> {
    let meeting = set_meeting_recording(
        &state.db,
        state.recall.as_ref(),
        &state.config.recall,
        &user,
        &id,
        request.enabled,
    )
    .await?;
    Ok(Json(meeting))
}
