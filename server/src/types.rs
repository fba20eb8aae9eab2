use std::fmt;

use crate::error::Error;

/// One UTF-8 JSON-RPC message on the wire.
pub type Message = String;

/// Outcome of handling one message. Notifications resolve to `NoMessage`;
/// transports translate that into HTTP 202 / no stdio write.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Message(Message),
    NoMessage,
}

/// Input that failed before it could be attributed to a well-formed frame
/// (unparseable JSON, broken JSON-RPC envelope). Carries the pre-serialised
/// error frame so HTTP transports can return it with a 4xx status instead of
/// a 200 response.
#[derive(Debug)]
pub struct InvalidMessage {
    pub response: Message,
    pub error: Error,
}

impl fmt::Display for InvalidMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for InvalidMessage {}
