use super::*;

use crate::db::{
    DbFeatureRequest, DbNextStep, FeatureRequestUpdate, NewNextStep, NextStepUpdate,
};
use crate::types::{FeatureRequestStatus, NextStepStatus, Urgency};

// =============================================================================
// Next steps
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct NextStepQuery {
    status: Option<String>,
}

pub(super) async fn list_next_steps(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Query(query): Query<NextStepQuery>,
) -> Result<Json<Vec<DbNextStep>>, ApiError> {
    let status = parse_filter(query.status.as_deref(), "status", NextStepStatus::parse)?;
    Ok(Json(state.db.lock().list_next_steps(&user, status)?))
}

pub(super) async fn create_next_step(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Json(new): Json<NewNextStep>,
) -> Result<(StatusCode, Json<DbNextStep>), ApiError> {
    if new.description.trim().is_empty() {
        return Err(ApiError::BadRequest("description is required".to_string()));
    }
    let db = state.db.lock();
    check_company_ref(&db, &user, new.company_id.as_deref())?;
    let step = db.create_next_step(&user, &new)?;
    Ok((StatusCode::CREATED, Json(step)))
}

/// Partial update; `{"status": "completed"}` and back toggles completion.
pub(super) async fn update_next_step(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(update): Json<NextStepUpdate>,
) -> Result<Json<DbNextStep>, ApiError> {
    state
        .db
        .lock()
        .update_next_step(&user, &id, &update)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Next step", &id))
}

pub(super) async fn delete_next_step(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.lock().delete_next_step(&user, &id)?;
    deleted(found, "Next step", &id)
}

// =============================================================================
// Feature requests
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct FeatureRequestQuery {
    status: Option<String>,
    urgency: Option<String>,
}

pub(super) async fn list_feature_requests(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Query(query): Query<FeatureRequestQuery>,
) -> Result<Json<Vec<DbFeatureRequest>>, ApiError> {
    let status = parse_filter(
        query.status.as_deref(),
        "status",
        FeatureRequestStatus::parse,
    )?;
    let urgency = parse_filter(query.urgency.as_deref(), "urgency", Urgency::parse)?;
    Ok(Json(
        state.db.lock().list_feature_requests(&user, status, urgency)?,
    ))
}

pub(super) async fn update_feature_request(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(update): Json<FeatureRequestUpdate>,
) -> Result<Json<DbFeatureRequest>, ApiError> {
    state
        .db
        .lock()
        .update_feature_request(&user, &id, &update)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Feature request", &id))
}

pub(super) async fn delete_feature_request(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.lock().delete_feature_request(&user, &id)?;
    deleted(found, "Feature request", &id)
}
