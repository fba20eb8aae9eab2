//! Streamable HTTP transport: plain HTTP until a handler first calls send,
//! SSE from that moment on.
//!
//! Every POST runs its handler in a task owned by the transport (not by the
//! request), so a streaming handler keeps producing frames after the
//! response headers have been committed. A single-slot latch delivers either
//! the synchronous [`HttpResult`] or the stream handle, whichever comes
//! first; taking the latch is what makes the SSE upgrade atomic.

use std::sync::Arc;
use std::sync::Mutex;

use http::HeaderMap;
use http::Method;
use minimcp_server::Message;
use minimcp_server::MiniMcp;
use minimcp_server::Reply;
use minimcp_server::Scope;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::http::CONTENT_TYPE_JSON;
use crate::http::CONTENT_TYPE_SSE;
use crate::http::HttpResult;
use crate::http::check_accept_header;
use crate::http::check_content_type;
use crate::http::check_protocol_version;

/// Size of the bounded channels between a streaming handler and the SSE
/// consumer.
const CHANNEL_CAPACITY: usize = 128;

type ResultLatch = Arc<Mutex<Option<oneshot::Sender<HttpResult>>>>;

/// The transport outlives individual requests: its task tracker owns every
/// in-flight handler, and [`shutdown`](Self::shutdown) drains them.
#[derive(Default)]
pub struct StreamableHttpTransport {
    tasks: TaskTracker,
}

impl StreamableHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn dispatch(
        &self,
        server: Arc<MiniMcp>,
        method: &Method,
        headers: &HeaderMap,
        body: String,
        scope: Option<Scope>,
    ) -> HttpResult {
        if method != Method::POST {
            return HttpResult::method_not_allowed();
        }
        if let Some(result) =
            check_accept_header(headers, &[CONTENT_TYPE_JSON, CONTENT_TYPE_SSE])
        {
            return result;
        }
        if let Some(result) = check_content_type(headers) {
            return result;
        }
        if let Some(result) = check_protocol_version(headers, &body) {
            return result;
        }
        if self.tasks.is_closed() {
            return HttpResult::internal("streamable HTTP transport is shut down");
        }

        let (result_tx, result_rx) = oneshot::channel();
        self.tasks
            .spawn(run_streaming_handler(server, body, scope, result_tx));

        match result_rx.await {
            Ok(result) => result,
            Err(_) => HttpResult::internal("handler task ended without producing a result"),
        }
    }

    /// Stops accepting new requests and waits for in-flight handlers,
    /// including ones still streaming past their HTTP response.
    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

async fn run_streaming_handler(
    server: Arc<MiniMcp>,
    body: String,
    scope: Option<Scope>,
    result_tx: oneshot::Sender<HttpResult>,
) {
    let latch: ResultLatch = Arc::new(Mutex::new(Some(result_tx)));
    let (handler_tx, handler_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
    let (stream_tx, stream_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);

    // Forwards handler sends onto the SSE stream; the first frame takes the
    // latch and commits the response to streaming before it is enqueued.
    let forwarder = tokio::spawn(forward_frames(
        handler_rx,
        stream_tx.clone(),
        stream_rx,
        latch.clone(),
    ));

    let outcome = server.handle(&body, Some(handler_tx), scope).await;
    // All send handles are gone once handle() returns, so the forwarder
    // drains whatever is queued and reports whether streaming started.
    let streaming = forwarder.await.unwrap_or(false);

    let final_result = match outcome {
        Ok(Reply::Message(message)) => {
            if streaming {
                if stream_tx.send(message).await.is_err() {
                    debug!("SSE consumer disconnected before the final frame");
                }
                None
            } else {
                Some(HttpResult::ok(message))
            }
        }
        Ok(Reply::NoMessage) => {
            if streaming {
                None
            } else {
                Some(HttpResult::accepted())
            }
        }
        Err(invalid) => {
            if streaming {
                if stream_tx.send(invalid.response).await.is_err() {
                    debug!("SSE consumer disconnected before the error frame");
                }
                None
            } else {
                Some(HttpResult::bad_request(invalid.response))
            }
        }
    };

    if let Some(result) = final_result
        && let Some(sender) = take_latch(&latch)
    {
        let _ = sender.send(result);
    }
}

async fn forward_frames(
    mut handler_rx: mpsc::Receiver<Message>,
    stream_tx: mpsc::Sender<Message>,
    stream_rx: mpsc::Receiver<Message>,
    latch: ResultLatch,
) -> bool {
    let mut stream_rx = Some(stream_rx);
    let mut streaming = false;

    while let Some(frame) = handler_rx.recv().await {
        if !streaming {
            streaming = true;
            if let (Some(sender), Some(rx)) = (take_latch(&latch), stream_rx.take()) {
                let _ = sender.send(HttpResult::sse(rx));
            }
        }
        if stream_tx.send(frame).await.is_err() {
            debug!("SSE consumer disconnected; dropping frame");
        }
    }

    streaming
}

fn take_latch(latch: &ResultLatch) -> Option<oneshot::Sender<HttpResult>> {
    latch
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}
