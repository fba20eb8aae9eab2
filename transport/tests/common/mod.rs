#![allow(dead_code)]

use std::sync::Arc;

use minimcp_server::Error;
use minimcp_server::Json;
use minimcp_server::MiniMcp;
use minimcp_server::ToolOptions;
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Deserialize, JsonSchema)]
pub struct MathArgs {
    pub a: f64,
    pub b: f64,
}

/// A small math server shared by the transport suites.
pub fn math_server() -> Arc<MiniMcp> {
    let server = MiniMcp::builder("math-server").version("0.1.0").build();
    server
        .tools
        .add(
            "add",
            ToolOptions::default(),
            |args: MathArgs| async move { Ok(Json(args.a + args.b)) },
        )
        .expect("add registers");
    server
        .tools
        .add(
            "add_with_progress",
            ToolOptions::default(),
            |args: MathArgs| async move {
                let responder = minimcp_server::Context::current()?.responder()?;
                for progress in [0.1, 0.4, 0.7] {
                    responder.report_progress(progress, Some(1.0), None).await;
                }
                Ok(Json(args.a + args.b))
            },
        )
        .expect("add_with_progress registers");
    server
        .tools
        .add(
            "divide",
            ToolOptions::default(),
            |args: MathArgs| async move {
                if args.b == 0.0 {
                    return Err(Error::Runtime("divide by zero".to_string()));
                }
                Ok(Json(args.a / args.b))
            },
        )
        .expect("divide registers");
    Arc::new(server)
}

pub fn call_tool_body(id: i64, name: &str, a: f64, b: f64, progress_token: Option<&str>) -> String {
    let mut params = serde_json::json!({ "name": name, "arguments": { "a": a, "b": b } });
    if let Some(token) = progress_token {
        params["_meta"] = serde_json::json!({ "progressToken": token });
    }
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": params
    })
    .to_string()
}

pub fn initialize_body(id: i64) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "0.0.1" }
        }
    })
    .to_string()
}
