//! Newline-delimited JSON-RPC over stdio
//!
//! Each inbound line is handled on its own task so a slow tool call never
//! blocks `ping` or other calls; a single writer task serializes responses.

use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::JoinSet,
};
use tracing::{debug, warn};

use crate::mcp::rpc::json_rpc_error;
use crate::mcp::server::handle_json_rpc_value;
use crate::AppState;

pub async fn serve<R, W>(state: AppState, input: R, output: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (responses_tx, responses_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(write_responses(output, responses_rx));

    let mut lines = BufReader::new(input).lines();
    let mut in_flight = JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let state = state.clone();
        let responses_tx = responses_tx.clone();
        in_flight.spawn(async move {
            if let Some(response) = handle_line(&state, &line).await {
                let _ = responses_tx.send(response);
            }
        });

        while let Some(finished) = in_flight.try_join_next() {
            if let Err(err) = finished {
                warn!(error = %err, "mcp request task failed");
            }
        }
    }

    debug!("stdin closed, draining in-flight requests");
    while let Some(finished) = in_flight.join_next().await {
        if let Err(err) = finished {
            warn!(error = %err, "mcp request task failed");
        }
    }

    drop(responses_tx);
    writer.await.map_err(std::io::Error::other)?
}

/// Handles one stdin line; `None` means nothing should be written back.
pub async fn handle_line(state: &AppState, line: &str) -> Option<Value> {
    let payload: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return Some(json_rpc_error(None, -32700, "Parse error")),
    };

    if let Some(batch) = payload.as_array() {
        if batch.is_empty() {
            return Some(Value::Array(vec![json_rpc_error(
                None,
                -32600,
                "Invalid Request",
            )]));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = handle_json_rpc_value(state, item.clone()).await {
                responses.push(response);
            }
        }

        if responses.is_empty() {
            return None;
        }

        return Some(Value::Array(responses));
    }

    handle_json_rpc_value(state, payload).await
}

async fn write_responses<W>(
    mut output: W,
    mut responses: mpsc::UnboundedReceiver<Value>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = responses.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}
