//! OpenAPI documentation and schema generation
//!
//! Compile-time spec generation with utoipa. Served at `/openapi.json` and,
//! when enabled, browsable at `/swagger-ui`.

use utoipa::OpenApi;

/// OpenAPI documentation for the bulk-dispatch REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "bulk-dispatch REST API",
        version = "0.1.0",
        description = "Control surface for confirmable, cancellable bulk runs against a remote device",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Runs
        crate::api::routes::start_run,
        crate::api::routes::cancel_run,
        crate::api::routes::get_status,

        // Confirmations
        crate::api::routes::get_pending_confirmation,
        crate::api::routes::answer_confirmation,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::RunId,
        crate::types::ConfirmationId,
        crate::types::RunState,
        crate::types::RunOutcome,
        crate::types::RunStatus,
        crate::types::ConfirmationKind,
        crate::types::LogLevel,
        crate::types::Event,
        crate::types::ReadinessResult,
        crate::types::ConnectionState,

        // Config types from config.rs
        crate::config::Config,
        crate::config::DeviceConfig,
        crate::config::RunConfig,
        crate::config::SimulationConfig,
        crate::config::ApiConfig,
        crate::config::TransportKind,

        // API request/response types
        crate::api::routes::StartRunRequest,
        crate::api::routes::StartRunResponse,
        crate::api::routes::AnswerConfirmationRequest,
        crate::api::state::PendingConfirmation,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "runs", description = "Bulk runs - Start, cancel and inspect runs"),
        (name = "confirmations", description = "Confirmations - Answer pre-flight and error prompts"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
