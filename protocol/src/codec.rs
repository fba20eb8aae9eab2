//! Parsing and frame construction.
//!
//! `parse_message` distinguishes three failure classes because they map to
//! different JSON-RPC error codes: text that is not JSON at all, JSON that is
//! not a JSON-RPC 2.0 object, and JSON-RPC objects whose payload fails the
//! MCP shape checks.

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::jsonrpc::ErrorData;
use crate::jsonrpc::JSONRPC_VERSION;
use crate::jsonrpc::JSONRPCError;
use crate::jsonrpc::JSONRPCMessage;
use crate::jsonrpc::JSONRPCNotification;
use crate::jsonrpc::JSONRPCResponse;
use crate::jsonrpc::NO_ID;
use crate::jsonrpc::RequestId;
use crate::requests::ServerNotification;

#[derive(Debug, Error)]
pub enum ParseMessageError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("invalid JSON-RPC message: {0}")]
    InvalidJsonRpc(String),
    #[error("invalid MCP message: {0}")]
    InvalidMcpMessage(String),
}

pub fn parse_message(message: &str) -> Result<JSONRPCMessage, ParseMessageError> {
    let value: Value = serde_json::from_str(message)
        .map_err(|err| ParseMessageError::InvalidJson(err.to_string()))?;

    let Value::Object(object) = &value else {
        return Err(ParseMessageError::InvalidJsonRpc(
            "message is not a JSON object".to_string(),
        ));
    };
    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(_) => {
            return Err(ParseMessageError::InvalidJsonRpc(format!(
                "jsonrpc version must be the literal \"{JSONRPC_VERSION}\""
            )));
        }
        None => {
            return Err(ParseMessageError::InvalidJsonRpc(
                "missing jsonrpc version field".to_string(),
            ));
        }
    }

    serde_json::from_value(value).map_err(|err| ParseMessageError::InvalidMcpMessage(err.to_string()))
}

/// Best-effort extraction of the message id from raw text, used to address
/// error frames for input that failed further downstream validation.
pub fn message_id_of(message: &str) -> Option<RequestId> {
    let value: Value = serde_json::from_str(message).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

/// Cheap body sniff used by the HTTP transports: protocol-version header
/// validation is skipped for `initialize`, where negotiation happens.
pub fn is_initialize_request(message: &str) -> bool {
    serde_json::from_str::<Value>(message)
        .ok()
        .and_then(|value| value.get("method").cloned())
        .is_some_and(|method| method == "initialize")
}

pub fn build_response_message(id: RequestId, result: Value) -> JSONRPCMessage {
    JSONRPCMessage::Response(JSONRPCResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result,
    })
}

pub fn build_notification_message(notification: &ServerNotification) -> JSONRPCMessage {
    let params = match notification {
        ServerNotification::Progress(params) => serde_json::to_value(params).ok(),
        ServerNotification::LoggingMessage(params) => serde_json::to_value(params).ok(),
    };
    JSONRPCMessage::Notification(JSONRPCNotification {
        jsonrpc: JSONRPC_VERSION.to_string(),
        method: notification.method().to_string(),
        params,
    })
}

/// Builds an error frame. `data` entries are preserved and an ISO-8601
/// timestamp is always attached; absent ids fall back to the `"no-id"`
/// sentinel.
pub fn build_error_message(
    code: i64,
    id: Option<RequestId>,
    message: impl Into<String>,
    data: Option<Value>,
) -> JSONRPCMessage {
    let mut data_object = match data {
        Some(Value::Object(object)) => object,
        Some(other) => {
            let mut object = serde_json::Map::new();
            object.insert("detail".to_string(), other);
            object
        }
        None => serde_json::Map::new(),
    };
    data_object.insert(
        "isoTimestamp".to_string(),
        json!(chrono::Utc::now().to_rfc3339()),
    );

    JSONRPCMessage::Error(JSONRPCError {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: id.unwrap_or_else(|| RequestId::String(NO_ID.to_string())),
        error: ErrorData {
            code,
            message: message.into(),
            data: Some(Value::Object(data_object)),
        },
    })
}

/// Serializes a frame to its single-line wire form. Serialization of these
/// types cannot fail for well-formed values; the fallback frame exists so
/// transports never have to handle a second error while reporting one.
pub fn serialize_message(message: &JSONRPCMessage) -> String {
    serde_json::to_string(message).unwrap_or_else(|_| {
        format!(
            r#"{{"jsonrpc":"2.0","id":"{NO_ID}","error":{{"code":{code},"message":"failed to serialize response"}}}}"#,
            code = crate::jsonrpc::INTERNAL_ERROR,
        )
    })
}
