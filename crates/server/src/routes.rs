//! JSON API for the pricing engine.
//!
//! Endpoints:
//! - `POST /api/v1/pricing/apply`                              — run pricing for an entity
//! - `GET  /api/v1/properties/{property_id}/overrides`         — list overrides in a range
//! - `PUT  /api/v1/properties/{property_id}/overrides`         — upsert manual overrides
//! - `GET  /api/v1/properties/{property_id}/bookings`          — list bookings for a month
//! - `POST /api/v1/properties/{property_id}/bookings`          — record a booking
//! - `GET  /api/v1/properties/{property_id}/recommendations`   — list recommendations in a range
//! - `GET  /api/v1/auto-pricing/status`                        — read auto-pricing status
//! - `PUT  /api/v1/auto-pricing/status`                        — enable or disable auto-pricing
//!
//! Every request carries the tenant in the `x-priceye-tenant` header. Failures
//! return a user-safe message plus a correlation id; the detail stays in logs.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use priceye_core::{
    ApiError, AutoPricingStatus, Booking, Cents, EngineError, EntityRef, EntityType, GroupId,
    PriceOverride, PricingRecommendation, PropertyId, RunSummary, TenantId,
};
use priceye_engine::{NewBooking, OverrideChange, PricingService};

pub const TENANT_HEADER: &str = "x-priceye-tenant";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PricingService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/pricing/apply", post(apply_pricing))
        .route(
            "/api/v1/properties/{property_id}/overrides",
            get(list_overrides).put(put_overrides),
        )
        .route(
            "/api/v1/properties/{property_id}/bookings",
            get(list_bookings).post(create_booking),
        )
        .route("/api/v1/properties/{property_id}/recommendations", get(list_recommendations))
        .route("/api/v1/auto-pricing/status", get(get_status).put(set_status))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EntitySelector {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntitySelector {
    fn to_ref(&self) -> EntityRef {
        match self.entity_type {
            EntityType::Property => EntityRef::Property(PropertyId(self.entity_id.clone())),
            EntityType::Group => EntityRef::Group(GroupId(self.entity_id.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Deserialize)]
pub struct OverrideChangeRequest {
    pub date: NaiveDate,
    pub price: Cents,
    #[serde(default)]
    pub is_locked: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PutOverridesRequest {
    pub changes: Vec<OverrideChangeRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub start_date: NaiveDate,
    pub end_date_exclusive: NaiveDate,
    pub price_per_night: Cents,
    pub channel: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

pub struct ApiFailure(pub ApiError);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.0.user_message(),
            "correlation_id": self.0.correlation_id(),
        });
        (status, Json(body)).into_response()
    }
}

fn fail(error: EngineError) -> ApiFailure {
    let correlation_id = Uuid::new_v4().to_string();
    warn!(
        event_name = "api.request_failed",
        correlation_id = %correlation_id,
        error = %error,
        "request failed"
    );
    ApiFailure(error.into_api(correlation_id))
}

fn tenant_from(headers: &HeaderMap) -> Result<TenantId, ApiFailure> {
    headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| TenantId(value.to_string()))
        .ok_or_else(|| {
            fail(EngineError::InputInvalid(format!("missing {TENANT_HEADER} header")))
        })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn apply_pricing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<RunSummary>, ApiFailure> {
    let tenant = tenant_from(&headers)?;
    let entity = EntitySelector {
        entity_type: request.entity_type,
        entity_id: request.entity_id,
    }
    .to_ref();
    let summary = state
        .service
        .apply_pricing_strategy(&tenant, &entity, request.force)
        .await
        .map_err(fail)?;
    Ok(Json(summary))
}

async fn list_overrides(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<PriceOverride>>, ApiFailure> {
    let tenant = tenant_from(&headers)?;
    let overrides = state
        .service
        .get_price_overrides(&tenant, &PropertyId(property_id), range.from, range.to)
        .await
        .map_err(fail)?;
    Ok(Json(overrides))
}

async fn put_overrides(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Json(request): Json<PutOverridesRequest>,
) -> Result<StatusCode, ApiFailure> {
    let tenant = tenant_from(&headers)?;
    let changes = request
        .changes
        .into_iter()
        .map(|change| OverrideChange {
            date: change.date,
            price: change.price,
            is_locked: change.is_locked,
            reason: change.reason,
        })
        .collect();
    state
        .service
        .update_price_overrides(&tenant, &PropertyId(property_id), changes)
        .await
        .map_err(fail)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Query(month): Query<MonthQuery>,
) -> Result<Json<Vec<Booking>>, ApiFailure> {
    let tenant = tenant_from(&headers)?;
    let bookings = state
        .service
        .get_bookings_for_month(&tenant, &PropertyId(property_id), month.year, month.month)
        .await
        .map_err(fail)?;
    Ok(Json(bookings))
}

async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiFailure> {
    let tenant = tenant_from(&headers)?;
    let booking = state
        .service
        .add_booking(
            &tenant,
            &PropertyId(property_id),
            NewBooking {
                start_date: request.start_date,
                end_date_exclusive: request.end_date_exclusive,
                price_per_night: request.price_per_night,
                channel: request.channel,
            },
        )
        .await
        .map_err(fail)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_recommendations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<PricingRecommendation>>, ApiFailure> {
    let tenant = tenant_from(&headers)?;
    let recommendations = state
        .service
        .get_recommendations(&tenant, &PropertyId(property_id), range.from, range.to)
        .await
        .map_err(fail)?;
    Ok(Json(recommendations))
}

async fn get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(selector): Query<EntitySelector>,
) -> Result<Json<AutoPricingStatus>, ApiFailure> {
    let tenant = tenant_from(&headers)?;
    let status = state
        .service
        .get_auto_pricing_status(&tenant, &selector.to_ref())
        .await
        .map_err(fail)?;
    Ok(Json(status))
}

async fn set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<AutoPricingStatus>, ApiFailure> {
    let tenant = tenant_from(&headers)?;
    let entity = EntitySelector {
        entity_type: request.entity_type,
        entity_id: request.entity_id,
    }
    .to_ref();
    let status = state
        .service
        .set_auto_pricing_enabled(&tenant, &entity, request.enabled)
        .await
        .map_err(fail)?;
    Ok(Json(status))
}
