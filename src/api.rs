use chrono::{DateTime, Utc};
use orderdesk_backend::{Order, PaymentStatus};
use rocket::http::Status;
use rocket::response::status::{BadRequest, Custom, NotFound};
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{Route, State, get, post, put, routes};
use tracing::error;

use crate::dashboard::Dashboard;
use crate::filter::OrderFilter;
use crate::journal::{self, JournalEntry};
use crate::poller::RefreshOutcome;
use crate::slots::generate_time_slots;
use crate::stats::DashboardStats;
use crate::transition::{OrderAction, available_actions};

const DEFAULT_JOURNAL_LIMIT: u32 = 50;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[get("/health")]
pub fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

fn api_error(error: impl ToString) -> Json<ApiError> {
    Json(ApiError {
        error: error.to_string(),
    })
}

/// Result envelope of every mutating route.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "success")]
pub enum MutationResponse {
    #[serde(rename = "true")]
    Success { message: String },
    #[serde(rename = "false")]
    Error { error: String },
}

impl MutationResponse {
    fn from_result<T, E: std::fmt::Display>(
        result: Result<T, E>,
        message: impl FnOnce(T) -> String,
    ) -> Json<Self> {
        Json(match result {
            Ok(value) => Self::Success {
                message: message(value),
            },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        })
    }
}

#[derive(Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
    pub total: usize,
    pub last_refreshed: Option<DateTime<Utc>>,
}

#[get("/orders?<search>&<status>&<time>")]
pub async fn list_orders(
    search: Option<&str>,
    status: Option<&str>,
    time: Option<&str>,
    dashboard: &State<Dashboard>,
) -> Result<Json<OrdersResponse>, BadRequest<Json<ApiError>>> {
    let filter = OrderFilter::parse(search, status, time).map_err(|e| BadRequest(api_error(e)))?;

    let orders = dashboard.list(&filter).await;
    let last_refreshed = dashboard.store.read().await.last_refreshed();

    Ok(Json(OrdersResponse {
        total: orders.len(),
        orders,
        last_refreshed,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub available_actions: Vec<OrderAction>,
}

impl From<Order> for OrderDetail {
    fn from(order: Order) -> Self {
        Self {
            available_actions: available_actions(order.status),
            order,
        }
    }
}

/// Opens the order in the detail view.
#[get("/orders/<key>")]
pub async fn get_order(
    key: &str,
    dashboard: &State<Dashboard>,
) -> Result<Json<OrderDetail>, NotFound<Json<ApiError>>> {
    dashboard
        .open(key)
        .await
        .map(|order| Json(order.into()))
        .ok_or_else(|| NotFound(api_error(format!("No order matches {key}"))))
}

#[get("/selection")]
pub async fn selected_order(
    dashboard: &State<Dashboard>,
) -> Result<Json<OrderDetail>, NotFound<Json<ApiError>>> {
    dashboard
        .selected()
        .await
        .map(|order| Json(order.into()))
        .ok_or_else(|| NotFound(api_error("No order is open")))
}

#[derive(Deserialize, Serialize)]
pub struct StatusRequest {
    pub action: OrderAction,
    #[serde(default)]
    pub confirm: bool,
}

#[post("/orders/<key>/status", format = "json", data = "<request>")]
pub async fn update_status(
    key: &str,
    request: Json<StatusRequest>,
    dashboard: &State<Dashboard>,
) -> Json<MutationResponse> {
    let result = dashboard
        .lifecycle
        .apply_action(key, request.action, request.confirm)
        .await;

    MutationResponse::from_result(result, |outcome| outcome.message)
}

#[derive(Deserialize, Serialize)]
pub struct PaymentRequest {
    pub payment_status: PaymentStatus,
}

#[post("/orders/<key>/payment", format = "json", data = "<request>")]
pub async fn update_payment(
    key: &str,
    request: Json<PaymentRequest>,
    dashboard: &State<Dashboard>,
) -> Json<MutationResponse> {
    let result = dashboard
        .lifecycle
        .set_payment_status(key, request.payment_status)
        .await;

    MutationResponse::from_result(result, |outcome| outcome.message)
}

#[post("/refresh")]
pub async fn refresh(dashboard: &State<Dashboard>) -> Json<MutationResponse> {
    let result = dashboard.refresher.refresh_now().await;

    MutationResponse::from_result(result, |outcome| match outcome {
        RefreshOutcome::Refreshed { total, pending, .. } => {
            format!("Loaded {total} orders, {pending} pending")
        }
        RefreshOutcome::Skipped => "Refresh already in progress".to_string(),
    })
}

#[get("/stats")]
pub async fn stats(dashboard: &State<Dashboard>) -> Json<DashboardStats> {
    Json(dashboard.stats().await)
}

#[derive(Serialize, Deserialize)]
pub struct SlotResponse {
    pub label: String,
    pub start: String,
    pub end: String,
}

#[get("/slots")]
pub fn slots() -> Json<Vec<SlotResponse>> {
    Json(
        generate_time_slots()
            .into_iter()
            .map(|slot| SlotResponse {
                label: slot.label(),
                start: slot.start_label(),
                end: slot.end_label(),
            })
            .collect(),
    )
}

#[derive(Serialize, Deserialize)]
pub struct SoundPreference {
    pub enabled: bool,
}

#[get("/preferences/sound")]
pub fn get_sound(dashboard: &State<Dashboard>) -> Json<SoundPreference> {
    Json(SoundPreference {
        enabled: dashboard.preferences.sound_enabled(),
    })
}

#[put("/preferences/sound", format = "json", data = "<request>")]
pub async fn put_sound(
    request: Json<SoundPreference>,
    dashboard: &State<Dashboard>,
) -> Json<MutationResponse> {
    let enabled = request.enabled;
    let result = dashboard.preferences.set_sound_enabled(enabled).await;

    MutationResponse::from_result(result, |()| {
        format!("Sound alerts {}", if enabled { "on" } else { "off" })
    })
}

#[get("/journal?<limit>")]
pub async fn journal_entries(
    limit: Option<u32>,
    dashboard: &State<Dashboard>,
) -> Result<Json<Vec<JournalEntry>>, Custom<Json<ApiError>>> {
    journal::recent(&dashboard.pool, limit.unwrap_or(DEFAULT_JOURNAL_LIMIT))
        .await
        .map(Json)
        .map_err(|e| {
            error!("Failed to read mutation journal: {e}");
            Custom(Status::InternalServerError, api_error(e))
        })
}

pub fn routes() -> Vec<Route> {
    routes![
        health,
        list_orders,
        get_order,
        selected_order,
        update_status,
        update_payment,
        refresh,
        stats,
        slots,
        get_sound,
        put_sound,
        journal_entries
    ]
}
