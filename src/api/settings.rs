use super::*;

use crate::db::{DbBlockedDomain, DbProfile};
use crate::google_api::calendar::CalendarSummary;
use crate::google_api::token_store::save_token;
use crate::google_api::{get_valid_access_token, GoogleToken};

// =============================================================================
// Profile
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProfileRequest {
    email: String,
    #[serde(default)]
    full_name: Option<String>,
}

pub(super) async fn get_profile(
    State(state): State<SharedState>,
    UserId(user): UserId,
) -> Result<Json<DbProfile>, ApiError> {
    state
        .db
        .lock()
        .get_profile(&user)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Profile", &user))
}

pub(super) async fn put_profile(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Json(request): Json<ProfileRequest>,
) -> Result<Json<DbProfile>, ApiError> {
    if !request.email.contains('@') {
        return Err(ApiError::BadRequest(format!("Invalid email '{}'", request.email)));
    }
    let profile = state
        .db
        .lock()
        .upsert_profile(&user, &request.email, request.full_name.as_deref())?;
    Ok(Json(profile))
}

// =============================================================================
// Google
// =============================================================================

/// Store the user's Google credentials and wake the auto-sync loop.
pub(super) async fn put_google_token(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Json(token): Json<GoogleToken>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if token.access_token.trim().is_empty() {
        return Err(ApiError::BadRequest("accessToken is required".to_string()));
    }
    save_token(&state.db.lock(), &user, &token)?;
    log::info!("Stored Google token for {}", user);
    state.sync_wake.notify_one();
    Ok(Json(serde_json::json!({
        "connected": true,
        "account": token.account,
    })))
}

pub(super) async fn list_calendars(
    State(state): State<SharedState>,
    UserId(user): UserId,
) -> Result<Json<Vec<CalendarSummary>>, ApiError> {
    let access_token = get_valid_access_token(
        &state.db,
        &state.http,
        &user,
        state.config.google.client_secret.as_deref(),
    )
    .await?;
    Ok(Json(state.google.list_calendars(&access_token).await?))
}

// =============================================================================
// Domain blocklist
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct BlocklistRequest {
    domain: String,
}

pub(super) async fn list_blocklist(
    State(state): State<SharedState>,
    UserId(user): UserId,
) -> Result<Json<Vec<DbBlockedDomain>>, ApiError> {
    Ok(Json(state.db.lock().list_blocked_domains(&user)?))
}

pub(super) async fn add_blocklist(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Json(request): Json<BlocklistRequest>,
) -> Result<(StatusCode, Json<DbBlockedDomain>), ApiError> {
    let domain = request.domain.trim().trim_start_matches('@');
    if domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(ApiError::BadRequest(format!("Invalid domain '{}'", request.domain)));
    }
    let entry = state.db.lock().add_blocked_domain(&user, domain)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub(super) async fn remove_blocklist(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.lock().remove_blocked_domain(&user, &id)?;
    deleted(found, "Blocked domain", &id)
}
