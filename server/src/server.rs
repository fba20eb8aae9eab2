//! The stateless message-processing core: parse, classify, route, reply.

use std::sync::Arc;
use std::time::Duration;

use minimcp_protocol::ClientNotification;
use minimcp_protocol::ClientRequest;
use minimcp_protocol::Implementation;
use minimcp_protocol::InitializeParams;
use minimcp_protocol::InitializeResult;
use minimcp_protocol::JSONRPCMessage;
use minimcp_protocol::LATEST_PROTOCOL_VERSION;
use minimcp_protocol::ListPromptsResult;
use minimcp_protocol::ListResourceTemplatesResult;
use minimcp_protocol::ListResourcesResult;
use minimcp_protocol::ListToolsResult;
use minimcp_protocol::PromptsCapability;
use minimcp_protocol::ReadResourceResult;
use minimcp_protocol::RequestId;
use minimcp_protocol::ResourcesCapability;
use minimcp_protocol::SUPPORTED_PROTOCOL_VERSIONS;
use minimcp_protocol::ServerCapabilities;
use minimcp_protocol::ToolsCapability;
use minimcp_protocol::ParseMessageError;
use minimcp_protocol::build_response_message;
use minimcp_protocol::message_id_of;
use minimcp_protocol::parse_message;
use minimcp_protocol::serialize_message;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;

use crate::context;
use crate::context::Context;
use crate::context::Scope;
use crate::error::Error;
use crate::handler::JsonObject;
use crate::limiter::Limiter;
use crate::prompts::PromptRegistry;
use crate::resources::ResourceRegistry;
use crate::responder::Responder;
use crate::tools::ToolRegistry;
use crate::types::InvalidMessage;
use crate::types::Message;
use crate::types::Reply;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;

/// A stateless MCP server runtime. Owns the primitive registries, which are
/// populated at startup; everything else lives for one `handle` call.
pub struct MiniMcp {
    name: String,
    version: Option<String>,
    instructions: Option<String>,
    include_stack_trace: bool,
    limiter: Limiter,
    pub tools: ToolRegistry,
    pub prompts: PromptRegistry,
    pub resources: ResourceRegistry,
}

pub struct MiniMcpBuilder {
    name: String,
    version: Option<String>,
    instructions: Option<String>,
    idle_timeout: Duration,
    max_concurrency: usize,
    include_stack_trace: bool,
}

impl MiniMcpBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            instructions: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            include_stack_trace: false,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Seconds a handler may stay idle (no outbound activity) before the
    /// call is cancelled.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Ceiling on concurrently handled messages; calls past it wait.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Attach backtraces to error frames. Off by default; intended for
    /// development setups only.
    pub fn include_stack_trace(mut self, include_stack_trace: bool) -> Self {
        self.include_stack_trace = include_stack_trace;
        self
    }

    pub fn build(self) -> MiniMcp {
        MiniMcp {
            name: self.name,
            version: self.version,
            instructions: self.instructions,
            include_stack_trace: self.include_stack_trace,
            limiter: Limiter::new(self.idle_timeout, self.max_concurrency),
            tools: ToolRegistry::new(),
            prompts: PromptRegistry::new(),
            resources: ResourceRegistry::new(),
        }
    }
}

impl MiniMcp {
    pub fn builder(name: impl Into<String>) -> MiniMcpBuilder {
        MiniMcpBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Handles one message. `send`, when provided, lets the handler push
    /// notification frames while the primary result is still being computed;
    /// `scope` is host-supplied per-message data exposed via the context.
    ///
    /// Input that cannot be attributed to a JSON-RPC frame (bad JSON, bad
    /// envelope) comes back through the error arm with a pre-serialised
    /// error frame, so HTTP transports can pair it with a 4xx status. Every
    /// other failure is folded into an `Ok` error frame.
    pub async fn handle(
        &self,
        message: &str,
        send: Option<mpsc::Sender<Message>>,
        scope: Option<Scope>,
    ) -> Result<Reply, InvalidMessage> {
        let rpc_msg = match parse_message(message) {
            Ok(rpc_msg) => rpc_msg,
            Err(ParseMessageError::InvalidJson(detail)) => {
                let err = Error::InvalidJson(detail);
                return Err(InvalidMessage {
                    response: self.error_frame(&err, None),
                    error: err,
                });
            }
            Err(ParseMessageError::InvalidJsonRpc(detail)) => {
                let err = Error::InvalidJsonRpcMessage(detail);
                return Err(InvalidMessage {
                    response: self.error_frame(&err, message_id_of(message)),
                    error: err,
                });
            }
            Err(ParseMessageError::InvalidMcpMessage(detail)) => {
                let err = Error::InvalidMcpMessage(detail);
                return Ok(Reply::Message(
                    self.error_frame(&err, message_id_of(message)),
                ));
            }
        };

        let message_id = match &rpc_msg {
            JSONRPCMessage::Request(request) => Some(request.id.clone()),
            _ => None,
        };

        let dispatched = self.handle_rpc_message(rpc_msg, send, scope).await;
        match dispatched {
            Ok(reply) => Ok(reply),
            Err(err) => Ok(Reply::Message(self.error_frame(&err, message_id))),
        }
    }

    async fn handle_rpc_message(
        &self,
        rpc_msg: JSONRPCMessage,
        send: Option<mpsc::Sender<Message>>,
        scope: Option<Scope>,
    ) -> Result<Reply, Error> {
        let guard = self.limiter.acquire().await?;
        let time_limiter = guard.time_limiter();

        let responder =
            send.map(|send| Responder::new(&rpc_msg, send, time_limiter.clone()));
        let context = Arc::new(Context::new(
            rpc_msg.clone(),
            time_limiter.clone(),
            scope,
            responder,
        ));

        match context::enter(context, time_limiter.limit(self.dispatch(rpc_msg))).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) | Err(err) => Err(err),
        }
    }

    async fn dispatch(&self, rpc_msg: JSONRPCMessage) -> Result<Reply, Error> {
        match rpc_msg {
            JSONRPCMessage::Request(request) => {
                let id = request.id.clone();
                if !ClientRequest::METHODS.contains(&request.method.as_str()) {
                    return Err(Error::MethodNotFound(format!(
                        "Method {} not found",
                        request.method
                    )));
                }
                let client_request = ClientRequest::try_from(request)
                    .map_err(|err| Error::InvalidMcpMessage(err.to_string()))?;

                debug!(id = %id, method = client_request.method(), "handling request");
                let result = self.handle_client_request(client_request).await?;
                debug!(id = %id, "request handled");

                let frame = build_response_message(id, result);
                Ok(Reply::Message(serialize_message(&frame)))
            }
            JSONRPCMessage::Notification(notification) => {
                match ClientNotification::try_from(notification) {
                    Ok(notification) => {
                        debug!(method = notification.method(), "handling notification");
                        self.handle_client_notification(notification);
                    }
                    Err(err) => {
                        debug!("no handler for notification, dropping: {err}");
                    }
                }
                Ok(Reply::NoMessage)
            }
            JSONRPCMessage::Response(_) | JSONRPCMessage::Error(_) => {
                Err(Error::UnsupportedMessageType(
                    "message to the server must be a request or notification".to_string(),
                ))
            }
        }
    }

    async fn handle_client_request(&self, request: ClientRequest) -> Result<Value, Error> {
        let method = request.method();
        match request {
            ClientRequest::Initialize { params, .. } => {
                to_result_value(self.initialize(&params))
            }
            ClientRequest::Ping { .. } => Ok(json!({})),
            ClientRequest::ListTools { .. } => to_result_value(ListToolsResult {
                tools: self.tools.list(),
                next_cursor: None,
            }),
            ClientRequest::CallTool { params, .. } => {
                to_result_value(self.tools.call(&params.name, params.arguments).await?)
            }
            ClientRequest::ListPrompts { .. } => to_result_value(ListPromptsResult {
                prompts: self.prompts.list(),
                next_cursor: None,
            }),
            ClientRequest::GetPrompt { params, .. } => {
                to_result_value(self.prompts.get(&params.name, params.arguments).await?)
            }
            ClientRequest::ListResources { .. } => to_result_value(ListResourcesResult {
                resources: self.resources.list(),
                next_cursor: None,
            }),
            ClientRequest::ListResourceTemplates { .. } => {
                to_result_value(ListResourceTemplatesResult {
                    resource_templates: self.resources.list_templates(),
                    next_cursor: None,
                })
            }
            ClientRequest::ReadResource { params, .. } => to_result_value(ReadResourceResult {
                contents: self.resources.read(&params.uri).await?,
            }),
            // Recognised methods with no handler on a stateless server:
            // subscriptions need session state and logging/completion were
            // never wired up.
            ClientRequest::Subscribe { .. }
            | ClientRequest::Unsubscribe { .. }
            | ClientRequest::SetLevel { .. }
            | ClientRequest::Complete { .. } => Err(Error::MethodNotFound(format!(
                "no handler registered for method {method}"
            ))),
        }
    }

    /// Stub notification handlers: a stateless server has no session to
    /// transition, so these only log. `notifications/initialized` is
    /// intentionally unhandled.
    fn handle_client_notification(&self, notification: ClientNotification) {
        match notification {
            ClientNotification::Initialized(params) => {
                debug!("notifications/initialized -> params: {params:?}");
            }
            ClientNotification::Progress(params) => {
                debug!("notifications/progress -> params: {params:?}");
            }
            ClientNotification::Cancelled(params) => {
                debug!("notifications/cancelled -> params: {params:?}");
            }
            ClientNotification::RootsListChanged(params) => {
                debug!("notifications/roots/list_changed -> params: {params:?}");
            }
        }
    }

    fn initialize(&self, params: &InitializeParams) -> InitializeResult {
        debug!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            protocol = %params.protocol_version,
            "initialize"
        );

        let protocol_version =
            if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
                params.protocol_version.clone()
            } else {
                LATEST_PROTOCOL_VERSION.to_string()
            };

        InitializeResult {
            protocol_version,
            capabilities: self.capabilities(),
            server_info: Implementation {
                name: self.name.clone(),
                title: None,
                version: self
                    .version
                    .clone()
                    .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            },
            instructions: self.instructions.clone(),
        }
    }

    /// A primitive's capability is advertised iff its list handler is
    /// registered. The three registries wire theirs at construction;
    /// `logging/setLevel` and `completion/complete` have none.
    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
            prompts: Some(PromptsCapability {
                list_changed: Some(false),
            }),
            resources: Some(ResourcesCapability {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            logging: None,
            completions: None,
            experimental: None,
        }
    }

    fn error_frame(&self, err: &Error, id: Option<RequestId>) -> Message {
        let mut data = match err.data() {
            Some(Value::Object(object)) => object,
            Some(other) => {
                let mut object = JsonObject::new();
                object.insert("detail".to_string(), other);
                object
            }
            None => JsonObject::new(),
        };
        if self.include_stack_trace {
            data.insert(
                "stackTrace".to_string(),
                Value::String(std::backtrace::Backtrace::force_capture().to_string()),
            );
        }
        let data = if data.is_empty() {
            None
        } else {
            Some(Value::Object(data))
        };

        error!(code = err.code(), "error while handling message: {err}");

        let frame = minimcp_protocol::build_error_message(err.code(), id, err.to_string(), data);
        serialize_message(&frame)
    }
}

fn to_result_value<T: serde::Serialize>(result: T) -> Result<Value, Error> {
    serde_json::to_value(result)
        .map_err(|err| Error::Runtime(format!("failed to serialize result: {err}")))
}
