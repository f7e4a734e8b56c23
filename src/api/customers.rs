use super::*;

use crate::db::{CustomerUpdate, DbCustomer, NewCustomer};
use crate::timeline::{customer_timeline, TimelineItem};

fn require_customer(db: &Db, user_id: &str, customer_id: &str) -> Result<DbCustomer, ApiError> {
    db.get_customer(user_id, customer_id)?
        .ok_or_else(|| ApiError::not_found("Customer", customer_id))
}

pub(super) async fn list(
    State(state): State<SharedState>,
    UserId(user): UserId,
) -> Result<Json<Vec<DbCustomer>>, ApiError> {
    Ok(Json(state.db.lock().list_customers(&user)?))
}

pub(super) async fn create(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Json(new): Json<NewCustomer>,
) -> Result<(StatusCode, Json<DbCustomer>), ApiError> {
    let email = new.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest(format!("Invalid email '{}'", new.email)));
    }
    let db = state.db.lock();
    check_company_ref(&db, &user, new.company_id.as_deref())?;
    let customer = db.create_customer(&user, &new)?;
    log::info!("Created customer {} for {}", customer.customer_id, user);
    Ok((StatusCode::CREATED, Json(customer)))
}

pub(super) async fn get_one(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<DbCustomer>, ApiError> {
    Ok(Json(require_customer(&state.db.lock(), &user, &id)?))
}

pub(super) async fn update(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(update): Json<CustomerUpdate>,
) -> Result<Json<DbCustomer>, ApiError> {
    let db = state.db.lock();
    check_company_ref(&db, &user, update.company_id.as_deref())?;
    db.update_customer(&user, &id, &update)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Customer", &id))
}

pub(super) async fn remove(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.lock().delete_customer(&user, &id)?;
    deleted(found, "Customer", &id)
}

pub(super) async fn timeline(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Vec<TimelineItem>>, ApiError> {
    let db = state.db.lock();
    require_customer(&db, &user, &id)?;
    Ok(Json(customer_timeline(&db, &user, &id)?))
}
