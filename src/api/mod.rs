//! JSON HTTP surface.
//!
//! Every route under `/api` except health and the Recall webhook needs an
//! `X-User-Id` header; the hosted platform's auth sits in front and sets it.
//! Handlers lock the database for one statement at a time and never across
//! an `.await`.
//!
//! Modules:
//! - companies: company CRUD plus per-company views
//! - customers: customer CRUD and timeline
//! - interactions: threads and meetings
//! - tasks: next steps and feature requests
//! - settings: profile, Google token, domain blocklist, calendars
//! - sync: sync jobs and the Recall webhook

mod companies;
mod customers;
mod interactions;
mod settings;
mod sync;
mod tasks;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::{Db, DbCompany};
use crate::error::ApiError;
use crate::state::SharedState;

const USER_HEADER: &str = "x-user-id";

/// Caller identity taken from the `X-User-Id` header.
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Settings
        .route("/api/profile", get(settings::get_profile).put(settings::put_profile))
        .route("/api/integrations/google", put(settings::put_google_token))
        .route("/api/calendars", get(settings::list_calendars))
        .route(
            "/api/domain-blocklist",
            get(settings::list_blocklist).post(settings::add_blocklist),
        )
        .route(
            "/api/domain-blocklist/{id}",
            axum::routing::delete(settings::remove_blocklist),
        )
        // Companies
        .route(
            "/api/companies",
            get(companies::list).post(companies::create),
        )
        .route(
            "/api/companies/{id}",
            get(companies::get_one)
                .patch(companies::update)
                .delete(companies::remove),
        )
        .route("/api/companies/{id}/timeline", get(companies::timeline))
        .route("/api/companies/{id}/next-steps", get(companies::next_steps))
        .route(
            "/api/companies/{id}/feature-requests",
            get(companies::feature_requests),
        )
        .route("/api/companies/{id}/customers", get(companies::customers))
        .route(
            "/api/companies/{id}/health/recalculate",
            post(companies::recalculate_health),
        )
        // Customers
        .route(
            "/api/customers",
            get(customers::list).post(customers::create),
        )
        .route(
            "/api/customers/{id}",
            get(customers::get_one)
                .patch(customers::update)
                .delete(customers::remove),
        )
        .route("/api/customers/{id}/timeline", get(customers::timeline))
        // Interactions
        .route("/api/threads/{id}", get(interactions::get_thread))
        .route("/api/meetings", get(interactions::list_meetings))
        .route("/api/meetings/{id}", get(interactions::get_meeting))
        .route(
            "/api/meetings/{id}/recording",
            post(interactions::set_recording),
        )
        // Tasks
        .route(
            "/api/next-steps",
            get(tasks::list_next_steps).post(tasks::create_next_step),
        )
        .route(
            "/api/next-steps/{id}",
            axum::routing::patch(tasks::update_next_step).delete(tasks::delete_next_step),
        )
        .route("/api/feature-requests", get(tasks::list_feature_requests))
        .route(
            "/api/feature-requests/{id}",
            axum::routing::patch(tasks::update_feature_request)
                .delete(tasks::delete_feature_request),
        )
        // Sync
        .route("/api/sync", post(sync::start))
        .route("/api/sync/latest", get(sync::latest))
        .route("/api/sync/{id}", get(sync::get_job))
        .route("/api/webhooks/recall", post(sync::recall_webhook))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Load a company owned by the caller or fail with 404.
fn require_company(db: &Db, user_id: &str, company_id: &str) -> Result<DbCompany, ApiError> {
    db.get_company(user_id, company_id)?
        .ok_or_else(|| ApiError::not_found("Company", company_id))
}

/// A referenced company must exist for the caller; anything else is a bad
/// request rather than a missing resource.
fn check_company_ref(db: &Db, user_id: &str, company_id: Option<&str>) -> Result<(), ApiError> {
    if let Some(id) = company_id {
        if db.get_company(user_id, id)?.is_none() {
            return Err(ApiError::BadRequest(format!("Unknown company {}", id)));
        }
    }
    Ok(())
}

/// Parse an optional query filter with the enum's own string form.
fn parse_filter<T>(
    value: Option<&str>,
    what: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid {} '{}'", what, raw))),
    }
}

fn deleted(found: bool, what: &str, id: &str) -> Result<StatusCode, ApiError> {
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(what, id))
    }
}
