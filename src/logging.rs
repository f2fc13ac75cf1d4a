use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::BridgeError;

/// Logs go to stderr; stdout carries MCP frames.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .compact()
        .init();
}

pub fn log_call_summary(method: &str, started_at: Instant, outcome: &Result<Value, BridgeError>) {
    let elapsed_ms = started_at.elapsed().as_millis();

    match outcome {
        Ok(_) => info!(
            method = %method,
            duration_ms = elapsed_ms,
            outcome = "success",
            "rpc call summary"
        ),
        Err(err) => warn!(
            method = %method,
            duration_ms = elapsed_ms,
            outcome = err.kind(),
            error = %err,
            "rpc call summary"
        ),
    }
}
