//! Admin API endpoints
//!
//! The JSON management surface for businesses, their FAQ pairs, and the
//! analytics event feed. Every route sits behind the Bearer API-key
//! middleware and the admin rate limiter.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use super::{ApiState, auth::require_api_key, rate_limit};
use crate::db::{Business, Event, Faq, NewBusiness};

// --- Request/Response types ---

#[derive(Deserialize)]
pub struct CreateBusinessRequest {
    pub name: String,
    pub phone_number: String,
    pub owner_phone: String,
    #[serde(default)]
    pub greeting_template: Option<String>,
    #[serde(default)]
    pub reply_template: Option<String>,
    #[serde(default)]
    pub ordering_url: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateBusinessRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner_phone: Option<String>,
    #[serde(default)]
    pub greeting_template: Option<String>,
    #[serde(default)]
    pub reply_template: Option<String>,
    #[serde(default)]
    pub ordering_url: Option<String>,
    #[serde(default)]
    pub llm_enabled: Option<bool>,
    #[serde(default)]
    pub alerts_enabled: Option<bool>,
}

#[derive(Deserialize)]
pub struct FaqPair {
    pub question: String,
    pub answer: String,
}

#[derive(Deserialize)]
pub struct ReplaceFaqsRequest {
    pub faqs: Vec<FaqPair>,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_events_limit")]
    pub limit: usize,
}

const fn default_events_limit() -> usize {
    50
}

#[derive(Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_stats_days")]
    pub days: i64,
}

const fn default_stats_days() -> i64 {
    7
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub days: i64,
    /// Event counts keyed by kind; kinds with no events are omitted
    pub counts: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

fn error_response(code: &str, message: &str) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        },
    })
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn db_error(e: &crate::Error) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_response("db_error", &e.to_string()),
    )
}

fn not_found(id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        error_response("not_found", &format!("no business with id {id}")),
    )
}

// --- Handlers ---

/// Create a business (or update the record holding the same phone number)
async fn create_business(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateBusinessRequest>,
) -> Result<(StatusCode, Json<Business>), ApiError> {
    if req.name.trim().is_empty() || req.phone_number.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            error_response("invalid", "name and phone_number are required"),
        ));
    }

    let business = state
        .businesses
        .upsert(&NewBusiness {
            name: req.name,
            phone_number: req.phone_number,
            owner_phone: req.owner_phone,
            greeting_template: req.greeting_template,
            reply_template: req.reply_template,
            ordering_url: req.ordering_url,
        })
        .map_err(|e| db_error(&e))?;

    state.directory.invalidate(&business.phone_number);
    Ok((StatusCode::CREATED, Json(business)))
}

/// List all businesses
async fn list_businesses(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<Business>>, ApiError> {
    let businesses = state.businesses.list_all().map_err(|e| db_error(&e))?;
    Ok(Json(businesses))
}

/// Get one business
async fn get_business(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Business>, ApiError> {
    state
        .businesses
        .find_by_id(&id)
        .map_err(|e| db_error(&e))?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// Update a business's profile fields and toggles
///
/// Absent fields keep their current values; the phone number itself is
/// immutable (create a new business to move numbers).
async fn update_business(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateBusinessRequest>,
) -> Result<Json<Business>, ApiError> {
    let existing = state
        .businesses
        .find_by_id(&id)
        .map_err(|e| db_error(&e))?
        .ok_or_else(|| not_found(&id))?;

    state
        .businesses
        .upsert(&NewBusiness {
            name: req.name.unwrap_or(existing.name),
            phone_number: existing.phone_number.clone(),
            owner_phone: req.owner_phone.unwrap_or(existing.owner_phone),
            greeting_template: Some(
                req.greeting_template.unwrap_or(existing.greeting_template),
            ),
            reply_template: Some(req.reply_template.unwrap_or(existing.reply_template)),
            // An explicit empty string clears the link; absent keeps it.
            ordering_url: match req.ordering_url {
                Some(url) if url.trim().is_empty() => None,
                Some(url) => Some(url),
                None => existing.ordering_url,
            },
        })
        .map_err(|e| db_error(&e))?;

    if req.llm_enabled.is_some() || req.alerts_enabled.is_some() {
        state
            .businesses
            .set_toggles(
                &id,
                req.llm_enabled.unwrap_or(existing.llm_enabled),
                req.alerts_enabled.unwrap_or(existing.alerts_enabled),
            )
            .map_err(|e| db_error(&e))?;
    }

    state.directory.invalidate(&existing.phone_number);

    state
        .businesses
        .find_by_id(&id)
        .map_err(|e| db_error(&e))?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// Replace a business's FAQ pairs
async fn replace_faqs(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(req): Json<ReplaceFaqsRequest>,
) -> Result<Json<Vec<Faq>>, ApiError> {
    if state
        .businesses
        .find_by_id(&id)
        .map_err(|e| db_error(&e))?
        .is_none()
    {
        return Err(not_found(&id));
    }

    let pairs: Vec<(String, String)> = req
        .faqs
        .into_iter()
        .map(|f| (f.question, f.answer))
        .collect();

    let faqs = state
        .businesses
        .replace_faqs(&id, &pairs)
        .map_err(|e| db_error(&e))?;

    Ok(Json(faqs))
}

/// List a business's FAQ pairs
async fn list_faqs(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Faq>>, ApiError> {
    if state
        .businesses
        .find_by_id(&id)
        .map_err(|e| db_error(&e))?
        .is_none()
    {
        return Err(not_found(&id));
    }
    let faqs = state.businesses.faqs_for(&id).map_err(|e| db_error(&e))?;
    Ok(Json(faqs))
}

/// Recent events for a business, newest first
async fn list_events(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    if state
        .businesses
        .find_by_id(&id)
        .map_err(|e| db_error(&e))?
        .is_none()
    {
        return Err(not_found(&id));
    }
    let limit = query.limit.min(500);
    let events = state
        .events
        .list_recent(&id, limit)
        .map_err(|e| db_error(&e))?;
    Ok(Json(events))
}

/// Event counts per kind over the trailing window, for dashboards
async fn business_stats(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    if state
        .businesses
        .find_by_id(&id)
        .map_err(|e| db_error(&e))?
        .is_none()
    {
        return Err(not_found(&id));
    }

    let days = query.days.clamp(1, 365);
    let counts = state
        .events
        .counts_since(&id, days)
        .map_err(|e| db_error(&e))?;

    let mut by_kind = serde_json::Map::new();
    for (kind, count) in counts {
        by_kind.insert(kind, serde_json::Value::from(count));
    }
    Ok(Json(StatsResponse {
        days,
        counts: by_kind,
    }))
}

/// Build the admin router with auth and rate-limit middleware
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/businesses", post(create_business))
        .route("/businesses", get(list_businesses))
        .route("/businesses/{id}", get(get_business))
        .route("/businesses/{id}", put(update_business))
        .route("/businesses/{id}/faqs", put(replace_faqs))
        .route("/businesses/{id}/faqs", get(list_faqs))
        .route("/businesses/{id}/events", get(list_events))
        .route("/businesses/{id}/stats", get(business_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(state)
}
