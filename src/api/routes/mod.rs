//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`runs`] - Start, cancel and inspect bulk runs
//! - [`confirmations`] - Answer pending confirmations
//! - [`system`] - Health, events, OpenAPI

use crate::types::RunId;
use serde::{Deserialize, Serialize};

mod confirmations;
mod runs;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use confirmations::*;
pub use runs::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Request body for POST /runs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartRunRequest {
    /// Number of unit operations (at least 1)
    pub count: u32,
    /// Text sent by every operation
    pub payload: String,
    /// Device address; falls back to `device.address` from the configuration
    #[serde(default)]
    pub address: Option<String>,
}

/// Response for POST /runs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartRunResponse {
    /// ID of the accepted run
    pub run_id: RunId,
}

/// Request body for POST /confirmations/:id
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct AnswerConfirmationRequest {
    /// `true` to proceed, `false` to decline
    pub approve: bool,
}
