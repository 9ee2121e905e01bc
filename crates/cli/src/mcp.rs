//! Model Context Protocol server exposing the `lumen_list` tool over stdio.
//!
//! Messages are newline-delimited JSON-RPC 2.0 objects. Requests get exactly
//! one response line on stdout; notifications (no `id` member) are handled
//! but never answered. Lines that are not valid JSON-RPC are skipped.

use lumen_catalog::{ListOptions, Lister};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::CliResult;

/// MCP revision implemented by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Name of the single tool offered.
pub const TOOL_NAME: &str = "lumen_list";
const SERVER_NAME: &str = "lumen-mcp-server";

const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Distinguishes `"id": null` (a request) from a missing `id` (a notification).
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl Response {
    fn new(id: Value, outcome: Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: "2.0",
            id,
            result,
            error,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Stdio MCP server answering `initialize`, `tools/list` and `tools/call`.
pub struct McpServer {
    lister: Lister,
}

impl McpServer {
    pub fn new(lister: Lister) -> Self {
        Self { lister }
    }

    /// Serve messages from `input` until it is closed or `cancel` fires.
    pub async fn serve<R, W>(
        &self,
        input: R,
        mut output: W,
        cancel: &CancellationToken,
    ) -> CliResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server listening on stdio");
        let mut lines = input.lines();

        loop {
            let line = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("MCP server cancelled");
                    return Ok(());
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("Input closed, stopping MCP server");
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            let request: Request = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed message");
                    continue;
                }
            };

            let outcome = self.handle(&request, cancel).await;
            let Some(id) = request.id else {
                debug!(method = %request.method, "Notification handled, no reply");
                continue;
            };

            let mut bytes = serde_json::to_vec(&Response::new(id, outcome))?;
            bytes.push(b'\n');
            output.write_all(&bytes).await?;
            output.flush().await?;
        }
    }

    async fn handle(&self, request: &Request, cancel: &CancellationToken) -> Result<Value, RpcError> {
        debug!(method = %request.method, "Handling MCP request");
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "tools/list" => Ok(json!({ "tools": [tool_definition()] })),
            "tools/call" => self.call_tool(&request.params, cancel).await,
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    async fn call_tool(&self, params: &Value, cancel: &CancellationToken) -> Result<Value, RpcError> {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err(RpcError::new(INVALID_PARAMS, "Invalid tool name"));
        };
        if name != TOOL_NAME {
            return Err(RpcError::new(INVALID_PARAMS, format!("Unknown tool: {name}")));
        }

        let empty = Map::new();
        let arguments = params
            .get("arguments")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let opts = tool_options(arguments);

        let failed = |message: String| {
            RpcError::new(INTERNAL_ERROR, format!("Tool execution failed: {message}"))
        };
        let results = self
            .lister
            .list(&opts, cancel)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let text = serde_json::to_string_pretty(&results).map_err(|e| failed(e.to_string()))?;

        Ok(json!({ "content": [{ "type": "text", "text": text }] }))
    }
}

/// Tool arguments of the wrong type are treated as absent.
fn tool_options(arguments: &Map<String, Value>) -> ListOptions {
    let string = |key: &str| {
        arguments
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    ListOptions {
        catalog: string("catalogRef"),
        catalogs: arguments
            .get("listCatalogs")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        version: string("ocpVersion"),
        package: string("packageName"),
        channel: string("channelName"),
    }
}

fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Introspects an operator-framework catalog image to list its contents. \
            Can list all packages (operators), all channels for a given package, or all bundle \
            versions for a given channel. Can also discover the published catalogs for an \
            OpenShift version.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "catalogRef": {
                    "type": "string",
                    "description": "Full image reference of the catalog to inspect, e.g. 'registry.redhat.io/redhat/community-operator-index:v4.16'.",
                },
                "ocpVersion": {
                    "type": "string",
                    "description": "OpenShift version, e.g. '4.16', used when discovering catalogs.",
                },
                "packageName": {
                    "type": "string",
                    "description": "Operator package to inspect within the catalog.",
                },
                "channelName": {
                    "type": "string",
                    "description": "Channel to inspect within the package.",
                },
                "listCatalogs": {
                    "type": "boolean",
                    "description": "Set to true to list the catalogs published for ocpVersion.",
                },
            },
        },
    })
}
