use std::sync::Arc;

use socket_bridge_mcp::{
    bridge::session::{BridgeSession, SessionSettings},
    config::Config,
    local_socket::LocalSocketConnector,
    logging, mcp, AppState,
};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let connector = Arc::new(LocalSocketConnector::new(&config.endpoint));
    let session = Arc::new(BridgeSession::new(
        connector,
        SessionSettings::from(&config),
    ));
    let state = AppState::new(session);

    info!(
        endpoint = %config.endpoint.display(),
        timeout_ms = config.timeout_ms,
        secret_configured = config.secret.is_some(),
        "bridge starting"
    );

    mcp::stdio::serve(state, tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("stdin closed, bridge exiting");
    Ok(())
}
