//! Query, ingestion and control endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::connectivity::{ConnectionStatus, ConnectivitySummary};
use crate::derivation::ServiceStatistics;
use crate::http::server::AppState;
use crate::kpi::ServiceInfo;
use crate::telemetry::{DerivedCounters, LogLevel, ServiceCallMetric};

const DEFAULT_LIMIT: usize = 100;

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// `default` addresses the unnamed channel.
fn channel_from_path(name: &str) -> &str {
    if name == "default" {
        ""
    } else {
        name
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: f64,
    pub version: String,
    pub timestamp: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        version: state.version.clone(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// --- Logs ---

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
    pub level: Option<String>,
}

pub async fn get_logs(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Response {
    let level = match query.level.as_deref().map(str::parse::<LogLevel>) {
        None => None,
        Some(Ok(level)) => Some(level),
        Some(Err(e)) => return error(StatusCode::BAD_REQUEST, e),
    };
    let logs = state.store.get_logs(query.limit.unwrap_or(DEFAULT_LIMIT), level);
    Json(logs).into_response()
}

#[derive(Debug, Deserialize)]
pub struct IngestLog {
    pub level: String,
    pub message: String,
    pub context: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub async fn ingest_log(State(state): State<AppState>, Json(body): Json<IngestLog>) -> Response {
    let level = match body.level.parse::<LogLevel>() {
        Ok(level) => level,
        Err(e) => return error(StatusCode::BAD_REQUEST, e),
    };
    let record = state
        .store
        .log(level, body.message, body.context.as_deref(), body.metadata);
    (StatusCode::CREATED, Json(record)).into_response()
}

pub async fn clear_logs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.store.clear_logs();
    state.logs.clear();
    Json(json!({ "cleared": cleared }))
}

// --- Metrics ---

#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    pub limit: Option<usize>,
    pub service: Option<String>,
}

pub async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let metrics = match query.service {
        Some(service) => {
            let mut metrics = state.store.service_metrics(&service);
            let skip = metrics.len().saturating_sub(limit);
            metrics.drain(..skip);
            metrics
        }
        None => state.store.recent_metrics(limit),
    };
    Json(metrics).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReport {
    pub service_name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    pub duration_ms: Option<f64>,
    pub status_code: Option<u16>,
}

/// A call measured by the reporting service.
pub async fn record_call(State(state): State<AppState>, Json(body): Json<CallReport>) -> Response {
    if body.service_name.is_empty() {
        return error(StatusCode::BAD_REQUEST, "serviceName is required");
    }
    let metric = match body.duration_ms {
        // Rejects negative, NaN and values too large for a Duration.
        Some(ms) => match Duration::try_from_secs_f64(ms / 1000.0) {
            Ok(duration) => state.store.record_call(
                &body.service_name,
                &body.method,
                &body.url,
                duration,
                body.status_code,
            ),
            Err(_) => {
                return error(
                    StatusCode::BAD_REQUEST,
                    "durationMs must be a non-negative number of milliseconds",
                )
            }
        },
        // Kept in the history but ignored by the statistics.
        None => state.store.append_metric(ServiceCallMetric {
            seq: 0,
            id: format!("{}_{}", body.service_name, uuid::Uuid::new_v4().simple()),
            service_name: body.service_name,
            method: body.method,
            url: body.url,
            timestamp: Utc::now(),
            duration_ms: None,
            status_code: body.status_code,
            counters: DerivedCounters::default(),
        }),
    };
    (StatusCode::CREATED, Json(metric)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStart {
    pub service_name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
}

/// Start timing a call on the hub's clock.
pub async fn start_call(State(state): State<AppState>, Json(body): Json<CallStart>) -> Response {
    if body.service_name.is_empty() {
        return error(StatusCode::BAD_REQUEST, "serviceName is required");
    }
    let id = state.store.start_call(&body.service_name, &body.method, &body.url);
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFinish {
    pub status_code: Option<u16>,
}

pub async fn finish_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let finish = if body.is_empty() {
        CallFinish::default()
    } else {
        match serde_json::from_slice::<CallFinish>(&body) {
            Ok(finish) => finish,
            Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
        }
    };
    let status_code = finish.status_code;
    match state.store.finish_call(&id, status_code) {
        Some(metric) => Json(metric).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("unknown call '{}'", id)),
    }
}

pub async fn clear_metrics(State(state): State<AppState>) -> StatusCode {
    state.board.clear();
    state.metrics.clear();
    state.performance.clear();
    StatusCode::NO_CONTENT
}

// --- Services ---

#[derive(Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub info: ServiceInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<ServiceStatistics>,
}

pub async fn get_services(State(state): State<AppState>) -> Json<Vec<ServiceView>> {
    let services = state
        .board
        .registry()
        .list()
        .into_iter()
        .map(|info| ServiceView {
            statistics: state.board.statistics(&info.name),
            info,
        })
        .collect();
    Json(services)
}

pub async fn toggle_service(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.board.registry().toggle(&name) {
        Some(active) => Json(json!({ "name": name, "active": active })).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("unknown service '{}'", name)),
    }
}

pub async fn get_endpoints(State(state): State<AppState>) -> Response {
    Json(state.board.endpoint_activity()).into_response()
}

// --- KPIs ---

pub async fn get_hero(State(state): State<AppState>) -> Response {
    Json(state.hero.current()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SimulationToggle {
    pub enabled: bool,
}

pub async fn set_simulation(
    State(state): State<AppState>,
    Json(body): Json<SimulationToggle>,
) -> Json<serde_json::Value> {
    if body.enabled {
        state.simulator.start();
    } else {
        state.simulator.stop();
    }
    state.hero.set_simulation_mode(body.enabled);
    Json(json!({ "simulating": state.simulator.is_running() }))
}

// --- Channels ---

#[derive(Serialize)]
pub struct ChannelsResponse {
    pub enabled: bool,
    pub summary: ConnectivitySummary,
    pub channels: Vec<ConnectionStatus>,
}

pub async fn get_channels(State(state): State<AppState>) -> Json<ChannelsResponse> {
    Json(match &state.connectivity {
        Some(manager) => ChannelsResponse {
            enabled: true,
            summary: manager.summary(),
            channels: manager.statuses(),
        },
        None => ChannelsResponse {
            enabled: false,
            summary: ConnectivitySummary::default(),
            channels: Vec::new(),
        },
    })
}

pub async fn diagnose_channel(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(manager) = &state.connectivity else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "connectivity is disabled");
    };
    match manager.diagnose(channel_from_path(&name)) {
        Some(report) => report.into_response(),
        None => error(StatusCode::NOT_FOUND, format!("unknown channel '{}'", name)),
    }
}

pub async fn reconnect_channel(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(manager) = &state.connectivity else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "connectivity is disabled");
    };
    let channel = channel_from_path(&name);
    match manager.reconnect(channel).await {
        Ok(()) => Json(json!({ "channel": name, "reconnected": true })).into_response(),
        Err(e) => error(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

// --- Supervisor ---

pub async fn get_supervisor(State(state): State<AppState>) -> Response {
    match &state.supervisor {
        Some(supervisor) => Json(supervisor.report()).into_response(),
        None => error(StatusCode::NOT_FOUND, "health supervisor is disabled"),
    }
}
