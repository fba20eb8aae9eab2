//! Transports for the MiniMCP runtime.
//!
//! Each transport owns its framing and hands complete messages to
//! [`minimcp_server::MiniMcp::handle`]: newline-delimited JSON on stdio, a
//! POST-only JSON endpoint over HTTP, and a streamable HTTP variant that
//! upgrades a response to SSE the moment a handler first sends a
//! notification. The axum adapter is the only piece that knows about a web
//! framework; everything else works on plain methods, headers and bodies.

mod adapter;
mod http;
mod stdio;
mod streamable;

pub use adapter::DEFAULT_SSE_PING;
pub use adapter::StreamableHttpState;
pub use adapter::http_endpoint;
pub use adapter::http_router;
pub use adapter::streamable_http_endpoint;
pub use adapter::streamable_http_router;
pub use http::CONTENT_TYPE_JSON;
pub use http::CONTENT_TYPE_SSE;
pub use http::HttpBody;
pub use http::HttpResult;
pub use http::HttpTransport;
pub use http::MCP_PROTOCOL_VERSION_HEADER;
pub use stdio::init_stderr_logging;
pub use stdio::run as run_stdio;
pub use stdio::run_with_io as run_stdio_with_io;
pub use streamable::StreamableHttpTransport;
