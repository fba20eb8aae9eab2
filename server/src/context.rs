//! Ambient per-message state.
//!
//! A [`Context`] exists strictly for the duration of one `handle()` call and
//! is exposed to the executing handler through a task-local, the moral
//! equivalent of the contextvars the original runtime used. Handlers running
//! for different messages can never observe each other's context.

use std::any::Any;
use std::sync::Arc;

use minimcp_protocol::JSONRPCMessage;

use crate::error::Error;
use crate::limiter::TimeLimiter;
use crate::responder::Responder;

/// Opaque per-message data supplied by the host, e.g. authenticated user
/// identity. Typed access happens via [`Context::scope`].
pub type Scope = Arc<dyn Any + Send + Sync>;

#[derive(Debug)]
pub struct Context {
    message: JSONRPCMessage,
    time_limiter: Arc<TimeLimiter>,
    scope: Option<Scope>,
    responder: Option<Responder>,
}

tokio::task_local! {
    static ACTIVE_CONTEXT: Arc<Context>;
}

impl Context {
    pub(crate) fn new(
        message: JSONRPCMessage,
        time_limiter: Arc<TimeLimiter>,
        scope: Option<Scope>,
        responder: Option<Responder>,
    ) -> Self {
        Self {
            message,
            time_limiter,
            scope,
            responder,
        }
    }

    /// The context of the message currently being handled on this task.
    pub fn current() -> Result<Arc<Context>, Error> {
        ACTIVE_CONTEXT.try_with(Arc::clone).map_err(|_| {
            Error::Context("no context: called outside of an active message".to_string())
        })
    }

    pub fn message(&self) -> &JSONRPCMessage {
        &self.message
    }

    pub fn time_limiter(&self) -> &Arc<TimeLimiter> {
        &self.time_limiter
    }

    /// Host-supplied scope, downcast to the type the host registered.
    pub fn scope<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        let scope = self
            .scope
            .clone()
            .ok_or_else(|| Error::Context("scope is not available in current context".to_string()))?;
        scope
            .downcast::<T>()
            .map_err(|_| Error::Context("scope does not have the requested type".to_string()))
    }

    pub fn responder(&self) -> Result<Responder, Error> {
        self.responder.clone().ok_or_else(|| {
            Error::Context("responder is not available in current context".to_string())
        })
    }
}

/// Runs `fut` with `context` active on the current task. Nested activation
/// is an error: one task handles one message at a time.
pub(crate) async fn enter<F: Future>(context: Arc<Context>, fut: F) -> Result<F::Output, Error> {
    if ACTIVE_CONTEXT.try_with(|_| ()).is_ok() {
        return Err(Error::Context(
            "nested contexts are not supported".to_string(),
        ));
    }
    Ok(ACTIVE_CONTEXT.scope(context, fut).await)
}
