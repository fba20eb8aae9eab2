//! axum adapter: the only framework-aware code in the crate.
//!
//! Routes accept every method and delegate to the transport dispatchers,
//! which own the 405 handling; stream bodies become SSE responses with a
//! periodic ping so intermediaries keep the connection open.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::routing::any;
use futures::StreamExt;
use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use http::Method;
use http::header;
use minimcp_server::MiniMcp;
use tokio_stream::wrappers::ReceiverStream;

use crate::http::HttpBody;
use crate::http::HttpResult;
use crate::http::HttpTransport;
use crate::streamable::StreamableHttpTransport;

pub const DEFAULT_SSE_PING: Duration = Duration::from_secs(15);

/// Single-endpoint router for the plain HTTP transport.
pub fn http_router(server: Arc<MiniMcp>) -> Router {
    Router::new().route("/", any(http_endpoint)).with_state(server)
}

pub async fn http_endpoint(
    State(server): State<Arc<MiniMcp>>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> Response {
    let result = HttpTransport::dispatch(&server, &method, &headers, &body, None).await;
    into_response(result, DEFAULT_SSE_PING)
}

#[derive(Clone)]
pub struct StreamableHttpState {
    pub server: Arc<MiniMcp>,
    pub transport: Arc<StreamableHttpTransport>,
    /// SSE ping interval; [`DEFAULT_SSE_PING`] unless configured otherwise.
    pub sse_ping: Duration,
}

/// Single-endpoint router for the streamable HTTP transport. The transport
/// is shared state so streaming handlers survive individual requests; call
/// [`StreamableHttpTransport::shutdown`] when tearing the app down.
pub fn streamable_http_router(state: StreamableHttpState) -> Router {
    Router::new()
        .route("/", any(streamable_http_endpoint))
        .with_state(state)
}

pub async fn streamable_http_endpoint(
    State(state): State<StreamableHttpState>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> Response {
    let result = state
        .transport
        .dispatch(state.server.clone(), &method, &headers, body, None)
        .await;
    into_response(result, state.sse_ping)
}

fn into_response(result: HttpResult, sse_ping: Duration) -> Response {
    let HttpResult {
        status,
        body,
        media_type,
        headers,
    } = result;

    let mut response = match body {
        HttpBody::Stream(receiver) => {
            let stream = ReceiverStream::new(receiver)
                .map(|frame| Ok::<_, Infallible>(Event::default().data(frame)));
            Sse::new(stream)
                .keep_alive(KeepAlive::new().interval(sse_ping).text("ping"))
                .into_response()
        }
        HttpBody::Message(message) => {
            let mut response = (status, message).into_response();
            if let Some(media_type) = media_type
                && let Ok(value) = HeaderValue::from_str(media_type)
            {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        HttpBody::Empty => status.into_response(),
    };

    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }

    response
}
