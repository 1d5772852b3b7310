//! Confirmation handlers.

use super::AnswerConfirmationRequest;
use crate::api::AppState;
use crate::error::Error;
use crate::types::ConfirmationId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /confirmations - The pending confirmation
#[utoipa::path(
    get,
    path = "/confirmations",
    tag = "confirmations",
    responses(
        (status = 200, description = "The pending confirmation, or null when nothing is pending", body = crate::api::state::PendingConfirmation)
    )
)]
pub async fn get_pending_confirmation(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pending_confirmation().await)
}

/// POST /confirmations/:id - Answer a pending confirmation
#[utoipa::path(
    post,
    path = "/confirmations/{id}",
    tag = "confirmations",
    params(
        ("id" = u64, Path, description = "Confirmation ID")
    ),
    request_body = AnswerConfirmationRequest,
    responses(
        (status = 204, description = "Answer delivered"),
        (status = 404, description = "No such pending confirmation", body = crate::error::ApiError)
    )
)]
pub async fn answer_confirmation(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(answer): Json<AnswerConfirmationRequest>,
) -> Response {
    let id = ConfirmationId(id);
    if state.answer_confirmation(id, answer.approve).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Error::NotFound(format!("confirmation {id} is not pending")).into_response()
    }
}
