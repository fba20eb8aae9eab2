//! Wire-level types for the Model Context Protocol.
//!
//! This crate is intentionally small: it defines the JSON-RPC 2.0 framing,
//! the MCP data model (tools, prompts, resources and friends), the typed
//! unions of client requests and notifications the server recognises, and a
//! codec that classifies malformed input precisely enough for the JSON-RPC
//! error taxonomy. Everything is plain serde; no I/O happens here.

mod codec;
mod jsonrpc;
mod model;
mod requests;
mod version;

pub use codec::ParseMessageError;
pub use codec::build_error_message;
pub use codec::build_notification_message;
pub use codec::build_response_message;
pub use codec::is_initialize_request;
pub use codec::message_id_of;
pub use codec::parse_message;
pub use codec::serialize_message;
pub use jsonrpc::ErrorData;
pub use jsonrpc::INTERNAL_ERROR;
pub use jsonrpc::INVALID_PARAMS;
pub use jsonrpc::INVALID_REQUEST;
pub use jsonrpc::JSONRPC_VERSION;
pub use jsonrpc::JSONRPCError;
pub use jsonrpc::JSONRPCMessage;
pub use jsonrpc::JSONRPCNotification;
pub use jsonrpc::JSONRPCRequest;
pub use jsonrpc::JSONRPCResponse;
pub use jsonrpc::METHOD_NOT_FOUND;
pub use jsonrpc::NO_ID;
pub use jsonrpc::PARSE_ERROR;
pub use jsonrpc::RESOURCE_NOT_FOUND;
pub use jsonrpc::RequestId;
pub use model::Annotations;
pub use model::BlobResourceContents;
pub use model::CallToolParams;
pub use model::CallToolResult;
pub use model::CancelledParams;
pub use model::ClientCapabilities;
pub use model::CompletionsCapability;
pub use model::ContentBlock;
pub use model::EmbeddedResource;
pub use model::GetPromptParams;
pub use model::GetPromptResult;
pub use model::ImageContent;
pub use model::Implementation;
pub use model::InitializeParams;
pub use model::InitializeResult;
pub use model::JsonObject;
pub use model::ListParams;
pub use model::ListPromptsResult;
pub use model::ListResourceTemplatesResult;
pub use model::ListResourcesResult;
pub use model::ListToolsResult;
pub use model::LoggingCapability;
pub use model::LoggingLevel;
pub use model::LoggingMessageParams;
pub use model::Prompt;
pub use model::PromptArgument;
pub use model::PromptMessage;
pub use model::PromptsCapability;
pub use model::ProgressNotificationParams;
pub use model::ProgressToken;
pub use model::ReadResourceParams;
pub use model::ReadResourceResult;
pub use model::Resource;
pub use model::ResourceContents;
pub use model::ResourceTemplate;
pub use model::ResourcesCapability;
pub use model::Role;
pub use model::ServerCapabilities;
pub use model::SetLevelParams;
pub use model::SubscribeParams;
pub use model::TextContent;
pub use model::TextResourceContents;
pub use model::Tool;
pub use model::ToolAnnotations;
pub use model::ToolsCapability;
pub use model::UnsubscribeParams;
pub use requests::ClientNotification;
pub use requests::ClientRequest;
pub use requests::ServerNotification;
pub use version::DEFAULT_NEGOTIATED_VERSION;
pub use version::LATEST_PROTOCOL_VERSION;
pub use version::SUPPORTED_PROTOCOL_VERSIONS;
