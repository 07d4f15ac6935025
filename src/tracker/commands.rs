use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{
    telemetry::{TelemetryReport, TelemetrySnapshot},
    tracker::MovementStatus,
    AppState,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const INVALID_REPORT: &str = "Invalid report";

#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
    pub message: String,
}

impl Ack {
    fn success() -> Self {
        Self {
            status: "success",
            message: "Data received".into(),
        }
    }

    fn rejected() -> Self {
        Self {
            status: "error",
            message: INVALID_REPORT.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub google_api_key: Option<String>,
}

fn decode_report(headers: &HeaderMap, body: &[u8]) -> anyhow::Result<TelemetryReport> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        TelemetryReport::from_form(body)
    } else {
        TelemetryReport::from_json(body)
    }
}

/// `POST /api/data`
pub async fn ingest_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let report = match decode_report(&headers, &body) {
        Ok(report) => report,
        Err(err) => {
            log_warn!("rejected report: {err:#}");
            return (StatusCode::BAD_REQUEST, Json(Ack::rejected())).into_response();
        }
    };

    let outcome = state.tracker.ingest(report).await;
    log_info!(
        "report stored ({} fields, triggered: {}, observers: {})",
        outcome.snapshot.fields().len(),
        outcome.triggered,
        outcome.observers
    );

    (StatusCode::OK, Json(Ack::success())).into_response()
}

/// `GET /api/data`
pub async fn get_latest(State(state): State<AppState>) -> Json<TelemetrySnapshot> {
    Json(state.tracker.current().as_ref().clone())
}

/// `GET /api/movement`
pub async fn get_movement(State(state): State<AppState>) -> Json<MovementStatus> {
    Json(state.tracker.movement_status().await)
}

/// `GET /api/config`
pub async fn get_client_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(ClientConfig {
        google_api_key: state.config.maps_api_key.clone(),
    })
}
