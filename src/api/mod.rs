//! REST API server module
//!
//! HTTP control surface for a [`BulkController`]: start and cancel runs, answer
//! confirmations, and follow progress over server-sent events. The HTTP client
//! plays the part of the confirmation responder.

use crate::confirmation::ConfirmationReceiver;
use crate::{BulkController, Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// Takes ownership of the controller's [`ConfirmationReceiver`]; pending
/// confirmations are parked in the state until a client answers them.
/// Must be called from within a Tokio runtime.
///
/// # Routes
///
/// ## Runs
/// - `POST /runs` - Start a bulk run (`{count, payload, address?}`)
/// - `POST /runs/cancel` - Cancel the active run
/// - `GET /status` - Current run status
///
/// ## Confirmations
/// - `GET /confirmations` - The pending confirmation, or `null`
/// - `POST /confirmations/:id` - Answer it (`{approve}`)
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(
    controller: BulkController,
    confirmations: ConfirmationReceiver,
    config: Arc<Config>,
) -> Router {
    let state = AppState::new(controller, confirmations, config.clone());

    let router = Router::new()
        // Runs
        .route("/runs", post(routes::start_run))
        .route("/runs/cancel", post(routes::cancel_run))
        .route("/status", get(routes::get_status))
        // Confirmations
        .route("/confirmations", get(routes::get_pending_confirmation))
        .route("/confirmations/:id", post(routes::answer_confirmation))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins ("*" allows any origin)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops.
///
/// # Example
///
/// ```no_run
/// use bulk_dispatch::{BulkController, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let (controller, confirmations) = BulkController::new(config.clone())?;
///
/// bulk_dispatch::api::start_api_server(controller, confirmations, Arc::new(config)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    controller: BulkController,
    confirmations: ConfirmationReceiver,
    config: Arc<Config>,
) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(controller, confirmations, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().map_err(crate::error::Error::Io)?,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
