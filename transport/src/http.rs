//! Plain HTTP transport: a POST-only JSON endpoint with strict header
//! validation. Framework-agnostic; the axum adapter translates
//! [`HttpResult`] into a real response.

use http::HeaderMap;
use http::Method;
use http::StatusCode;
use http::header;
use minimcp_protocol::DEFAULT_NEGOTIATED_VERSION;
use minimcp_protocol::INTERNAL_ERROR;
use minimcp_protocol::INVALID_REQUEST;
use minimcp_protocol::SUPPORTED_PROTOCOL_VERSIONS;
use minimcp_protocol::build_error_message;
use minimcp_protocol::is_initialize_request;
use minimcp_protocol::serialize_message;
use minimcp_server::Message;
use minimcp_server::MiniMcp;
use minimcp_server::Reply;
use minimcp_server::Scope;
use tokio::sync::mpsc;
use tracing::debug;

pub const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_SSE: &str = "text/event-stream";

pub(crate) const SSE_HEADERS: &[(&str, &str)] = &[
    ("Cache-Control", "no-cache, no-transform"),
    ("Connection", "keep-alive"),
    ("Content-Type", "text/event-stream"),
];

pub enum HttpBody {
    Message(Message),
    /// Frames to be delivered as one SSE event each, in channel order.
    Stream(mpsc::Receiver<Message>),
    Empty,
}

/// Transport-level result of one HTTP exchange.
pub struct HttpResult {
    pub status: StatusCode,
    pub body: HttpBody,
    pub media_type: Option<&'static str>,
    pub headers: Vec<(&'static str, &'static str)>,
}

impl HttpResult {
    pub(crate) fn ok(message: Message) -> Self {
        Self {
            status: StatusCode::OK,
            body: HttpBody::Message(message),
            media_type: Some(CONTENT_TYPE_JSON),
            headers: Vec::new(),
        }
    }

    pub(crate) fn accepted() -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            body: HttpBody::Empty,
            media_type: None,
            headers: Vec::new(),
        }
    }

    pub(crate) fn bad_request(frame: Message) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: HttpBody::Message(frame),
            media_type: Some(CONTENT_TYPE_JSON),
            headers: Vec::new(),
        }
    }

    pub(crate) fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: HttpBody::Empty,
            media_type: Some(CONTENT_TYPE_JSON),
            headers: vec![("Allow", "POST")],
        }
    }

    pub(crate) fn sse(stream: mpsc::Receiver<Message>) -> Self {
        Self {
            status: StatusCode::OK,
            body: HttpBody::Stream(stream),
            media_type: Some(CONTENT_TYPE_SSE),
            headers: SSE_HEADERS.to_vec(),
        }
    }

    /// A 4xx/5xx result whose body is a JSON-RPC error frame.
    pub(crate) fn error(status: StatusCode, code: i64, message: &str) -> Self {
        debug!(%status, code, message, "rejecting HTTP request");
        let frame = build_error_message(code, None, message, None);
        Self {
            status,
            body: HttpBody::Message(serialize_message(&frame)),
            media_type: Some(CONTENT_TYPE_JSON),
            headers: Vec::new(),
        }
    }

    pub(crate) fn internal(message: &str) -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, message)
    }
}

/// `Accept` must cover every needed content type; parameters after `;` are
/// ignored and matching is case-insensitive.
pub(crate) fn check_accept_header(headers: &HeaderMap, needed: &[&str]) -> Option<HttpResult> {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let accepted: Vec<String> = accept
        .split(',')
        .map(|entry| {
            entry
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase()
        })
        .collect();

    if needed
        .iter()
        .all(|required| accepted.iter().any(|accepted| accepted == required))
    {
        return None;
    }

    Some(HttpResult::error(
        StatusCode::NOT_ACCEPTABLE,
        INVALID_REQUEST,
        &format!("Not Acceptable: Client must accept {}", needed.join(" and ")),
    ))
}

pub(crate) fn check_content_type(headers: &HeaderMap) -> Option<HttpResult> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let content_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if content_type == CONTENT_TYPE_JSON {
        return None;
    }

    Some(HttpResult::error(
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        INVALID_REQUEST,
        &format!("Unsupported Media Type: Content-Type must be {CONTENT_TYPE_JSON}"),
    ))
}

/// Protocol-version validation is skipped for `initialize`, where
/// negotiation happens; a missing header means the negotiated default.
pub(crate) fn check_protocol_version(headers: &HeaderMap, body: &str) -> Option<HttpResult> {
    if is_initialize_request(body) {
        return None;
    }

    let version = headers
        .get(MCP_PROTOCOL_VERSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_NEGOTIATED_VERSION);

    if SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
        return None;
    }

    Some(HttpResult::error(
        StatusCode::BAD_REQUEST,
        INVALID_REQUEST,
        &format!(
            "Bad Request: Unsupported protocol version: {version}. Supported versions: {}",
            SUPPORTED_PROTOCOL_VERSIONS.join(", ")
        ),
    ))
}

pub struct HttpTransport;

impl HttpTransport {
    /// Dispatches one HTTP exchange against the server. Validation order is
    /// load-bearing: Accept before Content-Type, so 406 wins over 415.
    pub async fn dispatch(
        server: &MiniMcp,
        method: &Method,
        headers: &HeaderMap,
        body: &str,
        scope: Option<Scope>,
    ) -> HttpResult {
        if method != Method::POST {
            return HttpResult::method_not_allowed();
        }
        if let Some(result) = check_accept_header(headers, &[CONTENT_TYPE_JSON]) {
            return result;
        }
        if let Some(result) = check_content_type(headers) {
            return result;
        }
        if let Some(result) = check_protocol_version(headers, body) {
            return result;
        }

        match server.handle(body, None, scope).await {
            Ok(Reply::Message(message)) => HttpResult::ok(message),
            Ok(Reply::NoMessage) => HttpResult::accepted(),
            Err(invalid) => HttpResult::bad_request(invalid.response),
        }
    }
}
