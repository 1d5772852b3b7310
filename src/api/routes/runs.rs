//! Bulk run handlers.

use super::{StartRunRequest, StartRunResponse};
use crate::api::AppState;
use crate::error::Error;
use crate::types::BulkRunRequest;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /runs - Start a bulk run
///
/// The run proceeds in the background; it first raises a pre-flight
/// confirmation that must be answered through `/confirmations`.
#[utoipa::path(
    post,
    path = "/runs",
    tag = "runs",
    request_body = StartRunRequest,
    responses(
        (status = 202, description = "Run accepted", body = StartRunResponse),
        (status = 400, description = "Invalid request (zero count or no address)", body = crate::error::ApiError),
        (status = 409, description = "A run is already in progress", body = crate::error::ApiError)
    )
)]
pub async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> Response {
    let Some(address) = request
        .address
        .or_else(|| state.config.device.address.clone())
    else {
        return Error::InvalidRequest(
            "no device address given and none configured".to_string(),
        )
        .into_response();
    };

    let run = BulkRunRequest::new(request.count, request.payload);
    match state.controller.spawn_connect_and_run(address, run) {
        Ok(handle) => (
            StatusCode::ACCEPTED,
            Json(StartRunResponse {
                run_id: handle.run_id(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /runs/cancel - Cancel the active run
#[utoipa::path(
    post,
    path = "/runs/cancel",
    tag = "runs",
    responses(
        (status = 204, description = "Cancellation signalled"),
        (status = 409, description = "No run is active", body = crate::error::ApiError)
    )
)]
pub async fn cancel_run(State(state): State<AppState>) -> Response {
    match state.controller.cancel_active() {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /status - Current run status
#[utoipa::path(
    get,
    path = "/status",
    tag = "runs",
    responses(
        (status = 200, description = "Status of the current or most recent run", body = crate::types::RunStatus)
    )
)]
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.status())
}
