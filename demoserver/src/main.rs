//! The demoserver implements the same http interface as the greenhouse control
//! service, backed by an in-memory fake, so the client can be exercised
//! without real hardware.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use greenlib::fake::{FakeControlService, demo_sensor_snapshot};
use greenlib::service::{ControlService, ServiceError};
use greenlib::types::{Ack, ControlRequest, DeviceStates, ModeBody, SensorSnapshot};
use std::sync::Arc;

const PORT: u16 = 5000;

type Service = Arc<FakeControlService>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!())
        .module("greenlib")
        .verbosity(log::Level::Info)
        .init()?;

    log::info!("Starting greenhouse demoserver...");

    let service = Arc::new(FakeControlService::with_sensors(demo_sensor_snapshot(
        jiff::Timestamp::now(),
    )));

    let app = Router::new()
        .route("/status", get(status))
        .route("/sensor-data", get(sensor_data))
        .route("/operation-mode", get(get_mode).post(set_mode))
        .route("/control", post(control))
        .route("/reset", post(reset))
        .with_state(service);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", PORT)).await?;
    log::info!("Listening on port {PORT}");
    axum::serve(listener, app).await?;
    Ok(())
}

// Refusals are reported in the body with a 200, like the real service does.
fn error_response(endpoint: &str, err: ServiceError) -> Response {
    log::error!("Error handling {endpoint}: {err}");
    match err {
        ServiceError::Rejected { message } => Json(Ack::error(message)).into_response(),
        ServiceError::Status { status, body } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Ack::error(other.to_string())),
        )
            .into_response(),
    }
}

fn ack_response(endpoint: &str, result: Result<Ack, ServiceError>) -> Response {
    match result {
        Ok(ack) => Json(ack).into_response(),
        Err(err) => error_response(endpoint, err),
    }
}

async fn status(State(service): State<Service>) -> Result<Json<DeviceStates>, Response> {
    service
        .status()
        .await
        .map(Json)
        .map_err(|err| error_response("/status", err))
}

async fn sensor_data(State(service): State<Service>) -> Result<Json<SensorSnapshot>, Response> {
    service
        .sensor_data()
        .await
        .map(Json)
        .map_err(|err| error_response("/sensor-data", err))
}

async fn get_mode(State(service): State<Service>) -> Result<Json<ModeBody>, Response> {
    service
        .operation_mode()
        .await
        .map(|mode| Json(ModeBody { mode }))
        .map_err(|err| error_response("/operation-mode", err))
}

async fn set_mode(State(service): State<Service>, Json(body): Json<ModeBody>) -> Response {
    log::info!("POST /operation-mode called with {body:?}");
    ack_response(
        "/operation-mode",
        service.set_operation_mode(body.mode).await,
    )
}

async fn control(State(service): State<Service>, Json(req): Json<ControlRequest>) -> Response {
    log::info!("/control called with {req:?}");
    ack_response("/control", service.control(&req).await)
}

async fn reset(State(service): State<Service>) -> Response {
    log::info!("/reset called");
    ack_response("/reset", service.reset().await)
}
