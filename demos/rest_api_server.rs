//! REST API server example
//!
//! Serves the HTTP control surface over a simulated device. Try:
//!
//! ```text
//! curl -N localhost:6790/events &
//! curl -XPOST localhost:6790/runs -H 'content-type: application/json' \
//!      -d '{"count": 5, "payload": "label", "address": "sim"}'
//! curl localhost:6790/confirmations
//! curl -XPOST localhost:6790/confirmations/1 -H 'content-type: application/json' \
//!      -d '{"approve": true}'
//! ```

use bulk_dispatch::config::{Config, TransportKind};
use bulk_dispatch::{BulkController, api};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path).await?,
        None => {
            let mut config = Config::default();
            config.device.transport = TransportKind::Simulated;
            config.api.swagger_ui = true;
            config
        }
    };

    let (controller, confirmations) = BulkController::new(config.clone())?;

    let server = tokio::spawn(api::start_api_server(
        controller.clone(),
        confirmations,
        Arc::new(config),
    ));

    bulk_dispatch::run_with_shutdown(controller).await;
    server.abort();
    Ok(())
}
