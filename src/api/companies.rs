use super::*;

use crate::db::{CompanyUpdate, DbCustomer, DbFeatureRequest, DbNextStep, NewCompany};
use crate::health::recalculate_company_health;
use crate::timeline::{company_timeline, TimelineItem};

pub(super) async fn list(
    State(state): State<SharedState>,
    UserId(user): UserId,
) -> Result<Json<Vec<DbCompany>>, ApiError> {
    Ok(Json(state.db.lock().list_companies(&user)?))
}

pub(super) async fn create(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Json(new): Json<NewCompany>,
) -> Result<(StatusCode, Json<DbCompany>), ApiError> {
    if new.company_name.trim().is_empty() {
        return Err(ApiError::BadRequest("companyName is required".to_string()));
    }
    let company = state.db.lock().create_company(&user, &new)?;
    log::info!("Created company {} for {}", company.company_id, user);
    Ok((StatusCode::CREATED, Json(company)))
}

pub(super) async fn get_one(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<DbCompany>, ApiError> {
    Ok(Json(require_company(&state.db.lock(), &user, &id)?))
}

pub(super) async fn update(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(update): Json<CompanyUpdate>,
) -> Result<Json<DbCompany>, ApiError> {
    if update
        .company_name
        .as_deref()
        .is_some_and(|n| n.trim().is_empty())
    {
        return Err(ApiError::BadRequest("companyName cannot be blank".to_string()));
    }
    state
        .db
        .lock()
        .update_company(&user, &id, &update)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Company", &id))
}

pub(super) async fn remove(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.lock().delete_company(&user, &id)?;
    deleted(found, "Company", &id)
}

pub(super) async fn timeline(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Vec<TimelineItem>>, ApiError> {
    let db = state.db.lock();
    require_company(&db, &user, &id)?;
    Ok(Json(company_timeline(&db, &user, &id)?))
}

pub(super) async fn next_steps(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Vec<DbNextStep>>, ApiError> {
    let db = state.db.lock();
    require_company(&db, &user, &id)?;
    Ok(Json(db.list_company_next_steps(&user, &id)?))
}

pub(super) async fn feature_requests(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Vec<DbFeatureRequest>>, ApiError> {
    let db = state.db.lock();
    require_company(&db, &user, &id)?;
    Ok(Json(db.list_company_feature_requests(&user, &id)?))
}

pub(super) async fn customers(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Vec<DbCustomer>>, ApiError> {
    let db = state.db.lock();
    require_company(&db, &user, &id)?;
    Ok(Json(db.list_company_customers(&user, &id)?))
}

/// Recompute the score now instead of waiting for the next analysis.
pub(super) async fn recalculate_health(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<DbCompany>, ApiError> {
    let db = state.db.lock();
    require_company(&db, &user, &id)?;
    recalculate_company_health(&db, &user, &id)?;
    Ok(Json(require_company(&db, &user, &id)?))
}
