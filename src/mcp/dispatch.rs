/// JSON-RPC dispatch for MCP requests
///
/// The dispatcher turns one raw text message into at most one response.
/// Every failure, including a panic inside a tool, becomes a JSON-RPC error
/// value here; nothing escapes to the transport.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::mcp::protocol::*;
use crate::tools::{ToolError, ToolRegistry};

/// Failure of a single dispatched request
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            DispatchError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            DispatchError::Tool(_) => error_codes::TOOL_ERROR,
            DispatchError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    fn into_response(self, id: Value) -> JsonRpcResponse {
        let data = match &self {
            DispatchError::Tool(_) => Some(json!({"isError": true})),
            _ => None,
        };
        JsonRpcResponse::error(id, self.code(), self.to_string(), data)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Routes JSON-RPC requests to the tool registry
///
/// Cheap to share between connections; the registry is immutable and the
/// concurrency limit is global.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    limiter: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, max_concurrent_calls: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            limiter: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one raw message, returning the response to send, if any
    pub async fn handle_request(&self, raw: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse JSON-RPC request: {}", e);
                return Some(JsonRpcResponse::error(
                    json!(0),
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                    None,
                ));
            }
        };

        let request = match JsonRpcRequest::deserialize(&value) {
            Ok(request) => request,
            Err(e) => {
                let id = value
                    .get("id")
                    .filter(|id| id.is_string() || id.is_number())
                    .cloned()
                    .unwrap_or(json!(0));
                warn!("Rejecting malformed JSON-RPC request: {}", e);
                return Some(JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_REQUEST,
                    format!("Invalid Request: {}", e),
                    None,
                ));
            }
        };

        if is_notification(&request.method) {
            debug!("Received notification {}", request.method);
            return None;
        }

        let has_id = request.id.is_some();
        let response = self.dispatch(request).await;
        if has_id {
            Some(response)
        } else {
            debug!("Request without id handled; no response sent");
            None
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(json!(0));

        let outcome = match RpcMethod::from_name(&request.method) {
            None => Err(DispatchError::MethodNotFound(request.method)),
            Some(method) => AssertUnwindSafe(self.invoke(method, request.params))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic);
                    error!("Handler for {:?} panicked: {}", method, message);
                    Err(DispatchError::Internal(message))
                }),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                debug!("Request failed with {}: {}", e.code(), e);
                e.into_response(id)
            }
        }
    }

    async fn invoke(&self, method: RpcMethod, params: Option<Value>) -> Result<Value, DispatchError> {
        match method {
            RpcMethod::Initialize => {
                tracing::info!("MCP client initializing");
                serde_json::to_value(InitializeResult::current())
                    .map_err(|e| DispatchError::Internal(e.to_string()))
            }
            RpcMethod::ToolsList => Ok(json!({ "tools": self.registry.descriptors() })),
            RpcMethod::ToolsCall => self.call_tool(params).await,
            RpcMethod::Ping => Ok(json!({})),
        }
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, DispatchError> {
        let params = params.ok_or_else(|| DispatchError::InvalidParams("Missing parameters".to_string()))?;
        let params: ToolCallParams =
            serde_json::from_value(params).map_err(|e| DispatchError::InvalidParams(e.to_string()))?;

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| DispatchError::Internal("request limiter closed".to_string()))?;

        let result = self.registry.call(&params.name, params.arguments).await?;
        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| DispatchError::Internal(e.to_string()))?;

        serde_json::to_value(ToolCallResult::success(text))
            .map_err(|e| DispatchError::Internal(e.to_string()))
    }
}
