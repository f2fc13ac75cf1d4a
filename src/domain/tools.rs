//! Remote capabilities exposed as MCP tools
//!
//! Capabilities are listed through the remote `list_tools` method. Every
//! invocation carries the schema version cached from the last listing, and a
//! `schema_outdated` rejection clears that cache.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_mcp_sdk::schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::bridge::RemoteCaller;
use crate::errors::{AppError, BridgeError};
use crate::mcp::rpc::{app_error_to_json_rpc, json_rpc_error, json_rpc_result};
use crate::AppState;

pub const LIST_TOOLS_METHOD: &str = "list_tools";
pub const SCHEMA_VERSION_PARAM: &str = "_clientSchemaVersion";
pub const SCHEMA_OUTDATED_CODE: &str = "schema_outdated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        rename = "inputSchema",
        alias = "input_schema",
        default = "empty_input_schema"
    )]
    pub input_schema: Value,
}

fn empty_input_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CapabilityListing {
    Versioned {
        tools: Vec<CapabilityDescriptor>,
        #[serde(default, rename = "schemaVersion", alias = "schema_version")]
        schema_version: Option<Value>,
    },
    Bare(Vec<CapabilityDescriptor>),
}

#[derive(Debug, Deserialize)]
struct StructuredRemoteError {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

pub struct CapabilityAdapter {
    caller: Arc<dyn RemoteCaller>,
    schema_version: Mutex<Option<Value>>,
}

impl CapabilityAdapter {
    pub fn new(caller: Arc<dyn RemoteCaller>) -> Self {
        Self {
            caller,
            schema_version: Mutex::new(None),
        }
    }

    pub fn cached_schema_version(&self) -> Option<Value> {
        self.schema_slot().clone()
    }

    /// Never fails: an unreachable or misbehaving remote yields no tools.
    pub async fn list_capabilities(&self) -> Vec<CapabilityDescriptor> {
        let reply = match self.caller.call(LIST_TOOLS_METHOD, json!({})).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "failed to list remote capabilities");
                return Vec::new();
            }
        };

        match serde_json::from_value::<CapabilityListing>(reply) {
            Ok(CapabilityListing::Versioned {
                tools,
                schema_version,
            }) => {
                *self.schema_slot() = schema_version;
                tools
            }
            Ok(CapabilityListing::Bare(tools)) => tools,
            Err(err) => {
                warn!(error = %err, "remote capability listing is malformed");
                Vec::new()
            }
        }
    }

    pub async fn invoke_capability(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> CallToolResult {
        let mut params = arguments;
        if let Some(version) = self.cached_schema_version() {
            params.insert(SCHEMA_VERSION_PARAM.to_string(), version);
        }

        match self.caller.call(name, Value::Object(params)).await {
            Ok(result) => tool_success(result),
            Err(BridgeError::Remote { message }) => match parse_schema_outdated(&message) {
                Some(detail) => {
                    *self.schema_slot() = None;
                    info!(
                        tool = %name,
                        "remote reported outdated tool schema, cache cleared"
                    );
                    tool_failure(schema_outdated_text(detail.as_deref()))
                }
                None => tool_failure(format!("Error: {message}")),
            },
            Err(err) => tool_failure(format!("Error: {err}")),
        }
    }

    fn schema_slot(&self) -> MutexGuard<'_, Option<Value>> {
        self.schema_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Detects the schema-mismatch error, which arrives as JSON embedded in the
/// reply's error string. Returns the remote's detail message, if any.
fn parse_schema_outdated(message: &str) -> Option<Option<String>> {
    let structured: StructuredRemoteError = serde_json::from_str(message).ok()?;
    (structured.code == SCHEMA_OUTDATED_CODE).then_some(structured.message)
}

fn schema_outdated_text(detail: Option<&str>) -> String {
    let mut text = String::from(
        "The tool schema is outdated because the application changed its tools. \
         Refresh the tool list and retry the call.",
    );
    if let Some(detail) = detail.map(str::trim).filter(|detail| !detail.is_empty()) {
        text.push_str(" Details: ");
        text.push_str(detail);
    }
    text
}

fn tool_success(result: Value) -> CallToolResult {
    let text = match &result {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    let structured_content = match result {
        Value::Object(map) => Some(map),
        _ => None,
    };

    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: Some(false),
        meta: None,
        structured_content,
    }
}

fn tool_failure(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: Some(true),
        meta: None,
        structured_content: None,
    }
}

pub async fn build_tools_list(state: &AppState) -> Value {
    json!({ "tools": state.adapter.list_capabilities().await })
}

pub async fn handle_tools_call(
    state: &AppState,
    id: Option<Value>,
    params: Option<Value>,
) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, -32602, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
    };

    let arguments = match json!(tool_call.arguments.unwrap_or_default()) {
        Value::Object(arguments) => arguments,
        _ => return json_rpc_error(id, -32602, "Invalid params"),
    };

    let result = state
        .adapter
        .invoke_capability(&tool_call.name, arguments)
        .await;

    match serde_json::to_value(result) {
        Ok(result) => json_rpc_result(id, result),
        Err(err) => app_error_to_json_rpc(
            id,
            AppError::internal(format!("tool call result serialization: {err}")),
        ),
    }
}
