//! Stateless MCP server runtime.
//!
//! The crate is organised around one type, [`MiniMcp`]: a JSON-RPC
//! dispatcher owning three primitive registries (tools, prompts, resources),
//! a concurrency limiter with per-message idle deadlines, and an ambient
//! per-message [`Context`] through which handlers reach their scope and a
//! [`Responder`] for streamed progress notifications. No state survives a
//! `handle()` call except the registries themselves.

mod context;
mod error;
mod handler;
mod limiter;
mod prompts;
mod resources;
mod responder;
mod server;
mod tools;
mod types;

pub use context::Context;
pub use context::Scope;
pub use error::Error;
pub use handler::JsonObject;
pub use limiter::TimeLimiter;
pub use prompts::IntoPromptReturn;
pub use prompts::PromptOptions;
pub use prompts::PromptRegistry;
pub use prompts::PromptReturn;
pub use resources::IntoResourceReturn;
pub use resources::ResourceKind;
pub use resources::ResourceOptions;
pub use resources::ResourceRegistry;
pub use resources::ResourceReturn;
pub use resources::Structured;
pub use responder::Responder;
pub use server::DEFAULT_IDLE_TIMEOUT;
pub use server::DEFAULT_MAX_CONCURRENCY;
pub use server::MiniMcp;
pub use server::MiniMcpBuilder;
pub use tools::IntoToolReturn;
pub use tools::Json;
pub use tools::ToolOptions;
pub use tools::ToolRegistry;
pub use tools::ToolReturn;
pub use types::InvalidMessage;
pub use types::Message;
pub use types::Reply;
