//! Out-of-band notification sender handed to handlers via the context.

use std::sync::Arc;

use minimcp_protocol::JSONRPCMessage;
use minimcp_protocol::ProgressNotificationParams;
use minimcp_protocol::ProgressToken;
use minimcp_protocol::ServerNotification;
use minimcp_protocol::build_notification_message;
use minimcp_protocol::serialize_message;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use crate::limiter::TimeLimiter;
use crate::types::Message;

/// Sends progress (and arbitrary server) notifications for one in-flight
/// request. Cloning is cheap; all clones share the request's time limiter,
/// so any outbound activity keeps the handler alive.
#[derive(Clone, Debug)]
pub struct Responder {
    progress_token: Option<ProgressToken>,
    time_limiter: Arc<TimeLimiter>,
    send: mpsc::Sender<Message>,
}

impl Responder {
    pub(crate) fn new(
        request: &JSONRPCMessage,
        send: mpsc::Sender<Message>,
        time_limiter: Arc<TimeLimiter>,
    ) -> Self {
        Self {
            progress_token: progress_token_of(request),
            time_limiter,
            send,
        }
    }

    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    /// Reports progress for the current operation. A no-op (with a warning)
    /// when the originating request carried no progress token; returns the
    /// token that was notified otherwise.
    pub async fn report_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> Option<ProgressToken> {
        let Some(token) = self.progress_token.clone() else {
            warn!("report_progress failed: progress token is not available");
            return None;
        };

        self.send_notification(&ServerNotification::Progress(ProgressNotificationParams {
            progress_token: token.clone(),
            progress,
            total,
            message,
        }))
        .await;

        Some(token)
    }

    /// Sends a one-way server notification. Resets the idle deadline first:
    /// outbound activity is the liveness signal for long-running handlers.
    pub async fn send_notification(&self, notification: &ServerNotification) {
        let frame = build_notification_message(notification);

        self.time_limiter.reset();

        if self.send.send(serialize_message(&frame)).await.is_err() {
            debug!(
                method = notification.method(),
                "notification receiver is gone; dropping frame"
            );
        }
    }
}

/// The token lives at `params._meta.progressToken` of the originating
/// request; absent anywhere along that path means no progress reporting.
fn progress_token_of(request: &JSONRPCMessage) -> Option<ProgressToken> {
    let JSONRPCMessage::Request(request) = request else {
        return None;
    };
    let token = request.params.as_ref()?.get("_meta")?.get("progressToken")?;
    serde_json::from_value(token.clone()).ok()
}
