//! Typed views of the JSON-RPC frames the server recognises.
//!
//! The unions are generated by small macros so the wire method names, the
//! enum variants and the `METHODS` table cannot drift apart.

use serde::Deserialize;
use serde::Serialize;

use crate::jsonrpc::JSONRPCNotification;
use crate::jsonrpc::JSONRPCRequest;
use crate::jsonrpc::RequestId;
use crate::model::CallToolParams;
use crate::model::CancelledParams;
use crate::model::GetPromptParams;
use crate::model::InitializeParams;
use crate::model::JsonObject;
use crate::model::ListParams;
use crate::model::LoggingMessageParams;
use crate::model::ProgressNotificationParams;
use crate::model::ReadResourceParams;
use crate::model::SetLevelParams;
use crate::model::SubscribeParams;
use crate::model::UnsubscribeParams;

/// Generates `enum ClientRequest` where each variant is a request method the
/// server recognises, together with the `METHODS` table used to distinguish
/// "unknown method" from "bad params" during dispatch.
macro_rules! client_request_definitions {
    (
        $(
            $(#[doc = $variant_doc:literal])*
            $variant:ident => $wire:literal { params: $params:ty }
        ),* $(,)?
    ) => {
        #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
        #[serde(tag = "method")]
        pub enum ClientRequest {
            $(
                $(#[doc = $variant_doc])*
                #[serde(rename = $wire)]
                $variant {
                    #[serde(rename = "id")]
                    request_id: RequestId,
                    params: $params,
                },
            )*
        }

        impl ClientRequest {
            /// Wire names of every recognised request method.
            pub const METHODS: &[&str] = &[$($wire),*];

            pub fn request_id(&self) -> &RequestId {
                match self {
                    $(Self::$variant { request_id, .. } => request_id,)*
                }
            }

            pub fn method(&self) -> &'static str {
                match self {
                    $(Self::$variant { .. } => $wire,)*
                }
            }
        }
    };
}

client_request_definitions! {
    Initialize => "initialize" { params: InitializeParams },
    Ping => "ping" { params: Option<JsonObject> },
    ListTools => "tools/list" { params: Option<ListParams> },
    CallTool => "tools/call" { params: CallToolParams },
    ListPrompts => "prompts/list" { params: Option<ListParams> },
    GetPrompt => "prompts/get" { params: GetPromptParams },
    ListResources => "resources/list" { params: Option<ListParams> },
    ListResourceTemplates => "resources/templates/list" { params: Option<ListParams> },
    ReadResource => "resources/read" { params: ReadResourceParams },
    Subscribe => "resources/subscribe" { params: SubscribeParams },
    Unsubscribe => "resources/unsubscribe" { params: UnsubscribeParams },
    SetLevel => "logging/setLevel" { params: SetLevelParams },
    Complete => "completion/complete" { params: serde_json::Value },
}

impl TryFrom<JSONRPCRequest> for ClientRequest {
    type Error = serde_json::Error;

    fn try_from(value: JSONRPCRequest) -> Result<Self, Self::Error> {
        serde_json::from_value(serde_json::to_value(value)?)
    }
}

macro_rules! client_notification_definitions {
    (
        $(
            $variant:ident => $wire:literal ( $payload:ty )
        ),* $(,)?
    ) => {
        /// Notification sent from the client to the server. The stateless
        /// server logs and drops these; unknown methods fail conversion and
        /// are dropped by the dispatcher.
        #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
        #[serde(tag = "method", content = "params")]
        pub enum ClientNotification {
            $(
                #[serde(rename = $wire)]
                $variant($payload),
            )*
        }

        impl ClientNotification {
            pub fn method(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => $wire,)*
                }
            }
        }
    };
}

client_notification_definitions! {
    Initialized => "notifications/initialized" (Option<JsonObject>),
    Progress => "notifications/progress" (ProgressNotificationParams),
    Cancelled => "notifications/cancelled" (CancelledParams),
    RootsListChanged => "notifications/roots/list_changed" (Option<JsonObject>),
}

impl TryFrom<JSONRPCNotification> for ClientNotification {
    type Error = serde_json::Error;

    /// Conversion is by method name rather than through the derived
    /// deserializer so that notifications carrying no `params` field at all
    /// (`notifications/initialized` in the wild) still convert.
    fn try_from(value: JSONRPCNotification) -> Result<Self, Self::Error> {
        match value.method.as_str() {
            "notifications/initialized" => {
                Ok(Self::Initialized(optional_params(value.params)?))
            }
            "notifications/progress" => {
                Ok(Self::Progress(required_params(value.params, &value.method)?))
            }
            "notifications/cancelled" => {
                Ok(Self::Cancelled(required_params(value.params, &value.method)?))
            }
            "notifications/roots/list_changed" => {
                Ok(Self::RootsListChanged(optional_params(value.params)?))
            }
            other => Err(custom_error(format!(
                "unrecognized notification method {other}"
            ))),
        }
    }
}

fn custom_error(message: String) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(message)
}

fn required_params<T: serde::de::DeserializeOwned>(
    params: Option<serde_json::Value>,
    method: &str,
) -> Result<T, serde_json::Error> {
    let params = params.ok_or_else(|| custom_error(format!("{method} requires params")))?;
    serde_json::from_value(params)
}

fn optional_params(
    params: Option<serde_json::Value>,
) -> Result<Option<JsonObject>, serde_json::Error> {
    params
        .filter(|value| !value.is_null())
        .map(serde_json::from_value)
        .transpose()
}

macro_rules! server_notification_definitions {
    (
        $(
            $variant:ident => $wire:literal ( $payload:ty )
        ),* $(,)?
    ) => {
        /// Notification sent from the server to the client, out of band of
        /// any response frame.
        #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
        #[serde(tag = "method", content = "params")]
        pub enum ServerNotification {
            $(
                #[serde(rename = $wire)]
                $variant($payload),
            )*
        }

        impl ServerNotification {
            pub fn method(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => $wire,)*
                }
            }
        }
    };
}

server_notification_definitions! {
    Progress => "notifications/progress" (ProgressNotificationParams),
    LoggingMessage => "notifications/message" (LoggingMessageParams),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::jsonrpc::JSONRPC_VERSION;
    use crate::model::ProgressToken;

    use super::*;

    fn request(method: &str, params: serde_json::Value) -> JSONRPCRequest {
        JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Integer(1),
            method: method.to_string(),
            params: Some(params),
        }
    }

    #[test]
    fn converts_call_tool_request() {
        let converted = ClientRequest::try_from(request(
            "tools/call",
            json!({ "name": "add", "arguments": { "a": 5, "b": 3 } }),
        ))
        .expect("conversion should succeed");

        let ClientRequest::CallTool { request_id, params } = converted else {
            panic!("expected tools/call variant");
        };
        assert_eq!(request_id, RequestId::Integer(1));
        assert_eq!(params.name, "add");
        assert_eq!(
            params.arguments,
            json!({ "a": 5, "b": 3 }).as_object().cloned()
        );
    }

    #[test]
    fn unknown_method_fails_conversion() {
        let err = ClientRequest::try_from(request("tools/destroy", json!({})));
        assert!(err.is_err());
    }

    #[test]
    fn methods_table_matches_wire_names() {
        assert!(ClientRequest::METHODS.contains(&"initialize"));
        assert!(ClientRequest::METHODS.contains(&"resources/templates/list"));
        assert!(!ClientRequest::METHODS.contains(&"notifications/progress"));
    }

    #[test]
    fn converts_progress_notification() {
        let notification = JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/progress".to_string(),
            params: Some(json!({ "progressToken": "token-1", "progress": 0.5 })),
        };
        let converted =
            ClientNotification::try_from(notification).expect("conversion should succeed");
        let ClientNotification::Progress(params) = converted else {
            panic!("expected progress variant");
        };
        assert_eq!(params.progress_token, ProgressToken::String("token-1".to_string()));
        assert_eq!(params.progress, 0.5);
    }

    #[test]
    fn converts_initialized_notification_without_params() {
        let notification = JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        };
        let converted =
            ClientNotification::try_from(notification).expect("conversion should succeed");
        assert_eq!(converted, ClientNotification::Initialized(None));
    }

    #[test]
    fn unknown_notification_method_fails_conversion() {
        let notification = JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/unknown".to_string(),
            params: None,
        };
        assert!(ClientNotification::try_from(notification).is_err());
    }

    #[test]
    fn server_notification_serializes_method_and_params() {
        let notification = ServerNotification::Progress(ProgressNotificationParams {
            progress_token: ProgressToken::Integer(3),
            progress: 0.25,
            total: Some(1.0),
            message: None,
        });
        assert_eq!(
            json!({
                "method": "notifications/progress",
                "params": { "progressToken": 3, "progress": 0.25, "total": 1.0 }
            }),
            serde_json::to_value(notification).expect("serialize"),
        );
    }
}
