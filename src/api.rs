// 🌐 JSON API - Axum routes over the subscription store
//
// Every response is wrapped in ApiResponse { success, data, error }. All
// derived fields (effective renewal, status, totals) are computed per
// request from stored rows; nothing is written back except cancel /
// reactivate.

use crate::calendar::{self, CalendarDate};
use crate::config::Config;
use crate::dashboard::{classify, classify_all, payment_forecast, spend_totals, PaymentForecast, StatusCounts, SubscriptionView};
use crate::db::{get_all_subscriptions, get_events_for_entity, get_subscription, set_cancelled, Event};
use crate::normalizer::SpendTotals;
use crate::projector::upcoming_renewals;
use crate::reminders::{normalize_days_before, plan_reminders, ReminderPlan};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const UPCOMING_PREVIEW: usize = 3;
const MAX_HORIZON_DAYS: u32 = 366;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: Arc<Config>,

    /// Pinned "today" (tests); None = wall clock
    pub fixed_today: Option<CalendarDate>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
            fixed_today: None,
        }
    }

    pub fn with_today(mut self, today: CalendarDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    fn today(&self) -> CalendarDate {
        self.fixed_today.unwrap_or_else(calendar::today)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{e:#}"))
    }
}

impl From<crate::error::RenewalError> for ApiError {
    fn from(e: crate::error::RenewalError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::Internal(message) => {
                tracing::error!(%message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(ApiResponse::<()>::err(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SubscriptionDetail {
    #[serde(flatten)]
    pub view: SubscriptionView,
    pub upcoming: Vec<CalendarDate>,
}

#[derive(Debug, Serialize)]
pub struct TotalsResponse {
    pub totals: SpendTotals,
    pub counts: StatusCounts,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenewalCountResponse {
    pub count: usize,
    pub window_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/subscriptions - All subscriptions with effective renewal + status
async fn list_subscriptions(State(state): State<AppState>) -> ApiResult<Vec<SubscriptionView>> {
    let subs = get_all_subscriptions(&*state.conn()?)?;
    let views = classify_all(&subs, state.today(), i64::from(state.config.renews_soon_days));
    Ok(Json(ApiResponse::ok(views)))
}

/// GET /api/subscriptions/:id - One subscription plus its next few renewals
async fn subscription_detail(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SubscriptionDetail> {
    let sub = get_subscription(&*state.conn()?, &id)?.ok_or_else(|| ApiError::NotFound(format!("subscription {id}")))?;
    let today = state.today();

    let upcoming = match sub.anchor() {
        Ok(anchor) => upcoming_renewals(&anchor, today, UPCOMING_PREVIEW).unwrap_or_else(|e| {
            tracing::warn!(subscription = %sub.id, error = %e, "no renewal preview");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    };

    let view = classify(&sub, today, i64::from(state.config.renews_soon_days));
    Ok(Json(ApiResponse::ok(SubscriptionDetail { view, upcoming })))
}

/// POST /api/subscriptions/:id/cancel
async fn cancel_subscription(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SubscriptionView> {
    update_cancelled(&state, &id, true)
}

/// POST /api/subscriptions/:id/reactivate
async fn reactivate_subscription(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SubscriptionView> {
    update_cancelled(&state, &id, false)
}

fn update_cancelled(state: &AppState, id: &str, cancelled: bool) -> ApiResult<SubscriptionView> {
    let updated = set_cancelled(&*state.conn()?, id, cancelled, Utc::now(), "api")?
        .ok_or_else(|| ApiError::NotFound(format!("subscription {id}")))?;

    tracing::info!(subscription = %id, cancelled, "subscription status changed");

    let view = classify(&updated, state.today(), i64::from(state.config.renews_soon_days));
    Ok(Json(ApiResponse::ok(view)))
}

/// GET /api/subscriptions/:id/events - Audit trail, newest first
async fn subscription_events(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<Event>> {
    let conn = state.conn()?;
    if get_subscription(&conn, &id)?.is_none() {
        return Err(ApiError::NotFound(format!("subscription {id}")));
    }

    let events = get_events_for_entity(&conn, "subscription", &id)?;
    Ok(Json(ApiResponse::ok(events)))
}

/// GET /api/totals - Monthly / yearly spend per currency plus status counts
async fn totals(State(state): State<AppState>) -> ApiResult<TotalsResponse> {
    let subs = get_all_subscriptions(&*state.conn()?)?;
    let views = classify_all(&subs, state.today(), i64::from(state.config.renews_soon_days));

    Ok(Json(ApiResponse::ok(TotalsResponse {
        totals: spend_totals(&subs).rounded(),
        counts: StatusCounts::from_views(&views),
    })))
}

/// GET /api/forecast?days=N - Renewals due within the horizon
async fn forecast(State(state): State<AppState>, Query(query): Query<DaysQuery>) -> ApiResult<PaymentForecast> {
    let days = query
        .days
        .unwrap_or(state.config.forecast_days)
        .clamp(1, MAX_HORIZON_DAYS);

    let subs = get_all_subscriptions(&*state.conn()?)?;
    let forecast = payment_forecast(&subs, state.today(), days)?;
    Ok(Json(ApiResponse::ok(forecast)))
}

/// GET /api/renewal-count - How many subscriptions renew soon
async fn renewal_count(State(state): State<AppState>) -> ApiResult<RenewalCountResponse> {
    let window_days = state.config.renews_soon_days;
    let subs = get_all_subscriptions(&*state.conn()?)?;
    let views = classify_all(&subs, state.today(), i64::from(window_days));

    Ok(Json(ApiResponse::ok(RenewalCountResponse {
        count: StatusCounts::from_views(&views).renews_soon,
        window_days,
    })))
}

/// GET /api/reminders/due?days=N - Reminders that would go out today
async fn reminders_due(State(state): State<AppState>, Query(query): Query<DaysQuery>) -> ApiResult<ReminderPlan> {
    let days_before = normalize_days_before(query.days.unwrap_or(state.config.reminder_days_before));
    let subs = get_all_subscriptions(&*state.conn()?)?;
    Ok(Json(ApiResponse::ok(plan_reminders(&subs, state.today(), days_before))))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/:id", get(subscription_detail))
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/subscriptions/:id/reactivate", post(reactivate_subscription))
        .route("/subscriptions/:id/events", get(subscription_events))
        .route("/totals", get(totals))
        .route("/forecast", get(forecast))
        .route("/renewal-count", get(renewal_count))
        .route("/reminders/due", get(reminders_due))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
