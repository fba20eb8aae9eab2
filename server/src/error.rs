use minimcp_protocol as protocol;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

/// Every failure the server can surface to a client, together with its
/// JSON-RPC error-code mapping. Registration-time misuse (duplicate names,
/// unknown primitives) shares the `Primitive` variant so callers get one
/// error type across the whole API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid JSON-RPC message: {0}")]
    InvalidJsonRpcMessage(String),

    #[error("invalid MCP message: {0}")]
    InvalidMcpMessage(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Primitive(String),

    #[error("{0}")]
    MethodNotFound(String),

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("resource {uri} not found")]
    ResourceNotFound { uri: String },

    #[error("context error: {0}")]
    Context(String),

    #[error("{0}")]
    Runtime(String),

    #[error("handler exceeded the idle timeout of {seconds}s")]
    Timeout { seconds: u64 },
}

impl Error {
    pub fn code(&self) -> i64 {
        match self {
            Error::InvalidJson(_) => protocol::PARSE_ERROR,
            Error::InvalidJsonRpcMessage(_) | Error::UnsupportedMessageType(_) => {
                protocol::INVALID_REQUEST
            }
            Error::InvalidMcpMessage(_) | Error::InvalidParams(_) | Error::Primitive(_) => {
                protocol::INVALID_PARAMS
            }
            Error::MethodNotFound(_) => protocol::METHOD_NOT_FOUND,
            Error::ResourceNotFound { .. } => protocol::RESOURCE_NOT_FOUND,
            Error::Context(_) | Error::Runtime(_) | Error::Timeout { .. } => {
                protocol::INTERNAL_ERROR
            }
        }
    }

    /// Structured payload attached to the JSON-RPC error `data` field.
    pub fn data(&self) -> Option<Value> {
        match self {
            Error::ResourceNotFound { uri } => Some(json!({ "uri": uri })),
            Error::Timeout { seconds } => Some(json!({ "timeoutSeconds": seconds })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn codes_follow_the_error_taxonomy() {
        assert_eq!(Error::InvalidJson(String::new()).code(), -32700);
        assert_eq!(Error::InvalidJsonRpcMessage(String::new()).code(), -32600);
        assert_eq!(Error::UnsupportedMessageType(String::new()).code(), -32600);
        assert_eq!(Error::InvalidParams(String::new()).code(), -32602);
        assert_eq!(Error::MethodNotFound(String::new()).code(), -32601);
        assert_eq!(
            Error::ResourceNotFound { uri: "a://b".to_string() }.code(),
            -32002
        );
        assert_eq!(Error::Timeout { seconds: 30 }.code(), -32603);
        assert_eq!(Error::Context(String::new()).code(), -32603);
    }

    #[test]
    fn timeout_data_names_the_deadline() {
        let data = Error::Timeout { seconds: 30 }.data().expect("data");
        assert_eq!(data, json!({ "timeoutSeconds": 30 }));
    }
}
