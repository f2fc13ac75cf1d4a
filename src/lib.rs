use std::sync::Arc;

pub mod auth;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod errors;
pub mod local_socket;
pub mod logging;
pub mod mcp;

use bridge::RemoteCaller;
use domain::tools::CapabilityAdapter;

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<CapabilityAdapter>,
}

impl AppState {
    pub fn new(caller: Arc<dyn RemoteCaller>) -> Self {
        Self {
            adapter: Arc::new(CapabilityAdapter::new(caller)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use crate::bridge::session::{BridgeSession, SessionSettings};
    use crate::bridge::test_support::{DuplexConnector, SECRET};
    use crate::mcp::stdio::{handle_line, serve};

    use super::*;

    fn bridged_state() -> (
        AppState,
        tokio::sync::mpsc::UnboundedReceiver<crate::bridge::test_support::FakeRemote>,
    ) {
        let (connector, accepted) = DuplexConnector::new();
        let session = BridgeSession::new(
            Arc::new(connector),
            SessionSettings {
                secret: Some(SECRET.to_string()),
                timeout: Duration::from_secs(5),
            },
        );
        (AppState::new(Arc::new(session)), accepted)
    }

    fn unreachable_state() -> AppState {
        let (connector, _accepted) = DuplexConnector::new();
        connector.refuse_connections(true);
        let session = BridgeSession::new(Arc::new(connector), SessionSettings::default());
        AppState::new(Arc::new(session))
    }

    async fn request(state: &AppState, line: &str) -> Value {
        handle_line(state, line).await.expect("response expected")
    }

    #[tokio::test]
    async fn parse_error_is_reported() {
        let response = request(&unreachable_state(), "{not json").await;
        assert_eq!(response["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let response = request(
            &unreachable_state(),
            r#"{"jsonrpc":"2.0","id":1,"method":"unknown"}"#,
        )
        .await;

        assert_eq!(
            response,
            json!({"error":{"code":-32601,"message":"Method not found"},"id":1,"jsonrpc":"2.0"})
        );
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let response = handle_line(
            &unreachable_state(),
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn initialize_advertises_tools_only() {
        let response = request(
            &unreachable_state(),
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test-client","version":"1.0.0"},"capabilities":{}}}"#,
        )
        .await;

        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(
            response["result"]["serverInfo"]["name"],
            env!("CARGO_PKG_NAME")
        );
        assert!(response["result"]["capabilities"]["tools"].is_object());
        assert!(response["result"]["capabilities"]["resources"].is_null());
    }

    #[tokio::test]
    async fn empty_batch_is_invalid() {
        let response = request(&unreachable_state(), "[]").await;
        assert_eq!(response[0]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn tools_list_is_empty_when_application_is_down() {
        let response = request(
            &unreachable_state(),
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
        )
        .await;

        assert_eq!(response["id"], 2);
        assert_eq!(response["result"]["tools"], json!([]));
    }

    #[tokio::test]
    async fn tools_call_failure_is_a_structured_result() {
        let response = request(
            &unreachable_state(),
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"create_note","arguments":{}}}"#,
        )
        .await;

        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], json!(true));
        assert!(response["result"]["content"][0]["text"]
            .as_str()
            .expect("text")
            .contains("ensure the application is running"));
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let response = request(
            &unreachable_state(),
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"arguments":{}}}"#,
        )
        .await;

        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn stdio_round_trip_through_the_bridge() {
        let (state, mut accepted) = bridged_state();
        let (host, bridge_side) = tokio::io::duplex(64 * 1024);
        let (bridge_in, bridge_out) = tokio::io::split(bridge_side);
        let server = tokio::spawn(serve(state, bridge_in, bridge_out));

        let (host_read, mut host_write) = tokio::io::split(host);
        let mut host_lines = BufReader::new(host_read).lines();

        host_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
            .await
            .expect("write");

        let mut remote = accepted.recv().await.expect("bridge connected");
        remote.handshake().await;
        let listing = remote.recv().await.expect("list_tools request");
        assert_eq!(listing["method"], "list_tools");
        remote
            .send(json!({
                "id": listing["id"],
                "result": {"tools": [{"name": "create_note"}], "schemaVersion": 3}
            }))
            .await;

        let line = host_lines.next_line().await.expect("read").expect("line");
        let response: Value = serde_json::from_str(&line).expect("json");
        assert_eq!(response["result"]["tools"][0]["name"], "create_note");

        host_write
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"create_note\",\"arguments\":{\"title\":\"hi\"}}}\n",
            )
            .await
            .expect("write");

        let call = remote.recv().await.expect("tool call request");
        assert_eq!(call["method"], "create_note");
        assert_eq!(
            call["params"],
            json!({"title": "hi", "_clientSchemaVersion": 3})
        );
        remote
            .send(json!({
                "id": call["id"],
                "error": "{\"code\":\"schema_outdated\"}"
            }))
            .await;

        let line = host_lines.next_line().await.expect("read").expect("line");
        let response: Value = serde_json::from_str(&line).expect("json");
        assert_eq!(response["id"], 2);
        assert_eq!(response["result"]["isError"], json!(true));
        assert!(response["result"]["content"][0]["text"]
            .as_str()
            .expect("text")
            .contains("retry"));

        host_write.shutdown().await.expect("close stdin");
        server.await.expect("join").expect("serve");
    }
}
