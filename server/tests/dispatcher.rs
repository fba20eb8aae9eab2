//! End-to-end tests for `MiniMcp::handle`: raw JSON text in, frames out.

use std::sync::Arc;
use std::time::Duration;

use minimcp_server::Context;
use minimcp_server::Error;
use minimcp_server::Json;
use minimcp_server::MiniMcp;
use minimcp_server::Reply;
use minimcp_server::ResourceOptions;
use minimcp_server::ToolOptions;
use pretty_assertions::assert_eq;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;

#[derive(Deserialize, JsonSchema)]
struct MathArgs {
    a: f64,
    b: f64,
}

#[derive(Deserialize, JsonSchema)]
struct NameArg {
    name: String,
}

fn math_server() -> MiniMcp {
    let server = MiniMcp::builder("math-server").version("1.2.3").build();
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
    server
        .resources
        .add(
            "constants",
            "math://constants/{name}",
            ResourceOptions::default(),
            |args: NameArg| async move {
                match args.name.as_str() {
                    "pi" => Ok("3.14159".to_string()),
                    other => Err(Error::Runtime(format!("unknown constant {other}"))),
                }
            },
        )
        .expect("constants registers");
    server
}

async fn roundtrip(server: &MiniMcp, request: Value) -> Value {
    let reply = server
        .handle(&request.to_string(), None, None)
        .await
        .expect("well-formed frames never take the error arm");
    let Reply::Message(message) = reply else {
        panic!("expected a response message");
    };
    serde_json::from_str(&message).expect("response should be JSON")
}

fn request(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

#[tokio::test]
async fn initialize_echoes_supported_protocol_version() {
    let server = math_server();
    let response = roundtrip(
        &server,
        request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "0.1" }
            }),
        ),
    )
    .await;

    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(response["result"]["serverInfo"]["name"], "math-server");
    assert_eq!(response["result"]["serverInfo"]["version"], "1.2.3");

    let capabilities = &response["result"]["capabilities"];
    assert!(capabilities.get("tools").is_some());
    assert!(capabilities.get("prompts").is_some());
    assert!(capabilities.get("resources").is_some());
    assert!(capabilities.get("logging").is_none());
    assert!(capabilities.get("completions").is_none());
}

#[tokio::test]
async fn initialize_falls_back_to_latest_version() {
    let server = math_server();
    let response = roundtrip(
        &server,
        request(
            1,
            "initialize",
            json!({
                "protocolVersion": "1999-01-01",
                "clientInfo": { "name": "test-client", "version": "0.1" }
            }),
        ),
    )
    .await;

    assert_eq!(response["result"]["protocolVersion"], "2025-06-18");
}

#[tokio::test]
async fn tools_call_returns_structured_result_with_original_id() {
    let server = math_server();
    let response = roundtrip(
        &server,
        request(7, "tools/call", json!({ "name": "add", "arguments": { "a": 5, "b": 3 } })),
    )
    .await;

    assert_eq!(response["id"], 7);
    assert_eq!(response["result"]["isError"], false);
    assert_eq!(response["result"]["structuredContent"]["result"], 8.0);
    assert_eq!(response["result"]["content"][0]["text"], "8.0");
}

#[tokio::test]
async fn tool_failures_are_results_not_rpc_errors() {
    let server = math_server();
    let response = roundtrip(
        &server,
        request(8, "tools/call", json!({ "name": "divide", "arguments": { "a": 10, "b": 0 } })),
    )
    .await;

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], true);
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("text content");
    assert!(text.contains("divide by zero"));
}

#[tokio::test]
async fn resources_read_resolves_templates() {
    let server = math_server();
    let response = roundtrip(
        &server,
        request(9, "resources/read", json!({ "uri": "math://constants/pi" })),
    )
    .await;

    let text = response["result"]["contents"][0]["text"]
        .as_str()
        .expect("text contents");
    assert!(text.contains("3.14159"));
}

#[tokio::test]
async fn unknown_resource_uses_resource_not_found_code() {
    let server = math_server();
    let response = roundtrip(
        &server,
        request(10, "resources/read", json!({ "uri": "math://missing/x" })),
    )
    .await;

    assert_eq!(response["error"]["code"], -32002);
    assert_eq!(response["error"]["data"]["uri"], "math://missing/x");
}

#[tokio::test]
async fn unknown_method_maps_to_method_not_found() {
    let server = math_server();
    let response = roundtrip(&server, request(11, "tools/destroy", json!({}))).await;
    assert_eq!(response["id"], 11);
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn recognised_but_unregistered_methods_map_to_method_not_found() {
    let server = math_server();
    let response = roundtrip(
        &server,
        request(12, "resources/subscribe", json!({ "uri": "math://constants/pi" })),
    )
    .await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn ping_answers_with_an_empty_object() {
    let server = math_server();
    let response = roundtrip(&server, request(13, "ping", json!({}))).await;
    assert_eq!(response["result"], json!({}));
}

#[tokio::test]
async fn malformed_json_takes_the_error_arm_with_no_id() {
    let server = math_server();
    let err = server
        .handle("{ not json", None, None)
        .await
        .expect_err("parse failures take the error arm");

    let frame: Value = serde_json::from_str(&err.response).expect("error frame is JSON");
    assert_eq!(frame["error"]["code"], -32700);
    assert_eq!(frame["id"], "no-id");
    assert!(frame["error"]["data"]["isoTimestamp"].is_string());
}

#[tokio::test]
async fn wrong_jsonrpc_version_takes_the_error_arm() {
    let server = math_server();
    let err = server
        .handle(
            &json!({ "jsonrpc": "1.0", "id": 1, "method": "ping" }).to_string(),
            None,
            None,
        )
        .await
        .expect_err("envelope failures take the error arm");

    let frame: Value = serde_json::from_str(&err.response).expect("error frame is JSON");
    assert_eq!(frame["error"]["code"], -32600);
}

#[tokio::test]
async fn notifications_resolve_to_no_message() {
    let server = math_server();
    let reply = server
        .handle(
            &json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
            None,
            None,
        )
        .await
        .expect("notification handling succeeds");
    assert_eq!(reply, Reply::NoMessage);
}

#[tokio::test]
async fn unknown_notifications_are_dropped_silently() {
    let server = math_server();
    let reply = server
        .handle(
            &json!({ "jsonrpc": "2.0", "method": "notifications/whatever" }).to_string(),
            None,
            None,
        )
        .await
        .expect("unknown notifications are dropped");
    assert_eq!(reply, Reply::NoMessage);
}

#[tokio::test]
async fn response_frames_are_unsupported() {
    let server = math_server();
    let response = roundtrip(
        &server,
        json!({ "jsonrpc": "2.0", "id": 5, "result": { "ok": true } }),
    )
    .await;
    assert_eq!(response["error"]["code"], -32600);
}

#[tokio::test]
async fn progress_notifications_stream_through_send_in_order() {
    let server = MiniMcp::builder("progress-server").build();
    server
        .tools
        .add(
            "add_with_progress",
            ToolOptions::default(),
            |args: MathArgs| async move {
                let context = Context::current()?;
                let responder = context.responder()?;
                for progress in [0.1, 0.4, 0.7] {
                    responder.report_progress(progress, Some(1.0), None).await;
                }
                Ok(Json(args.a + args.b))
            },
        )
        .expect("registers");

    let (tx, mut rx) = mpsc::channel(16);
    let request = json!({
        "jsonrpc": "2.0",
        "id": 21,
        "method": "tools/call",
        "params": {
            "name": "add_with_progress",
            "arguments": { "a": 7, "b": 13 },
            "_meta": { "progressToken": "tok-21" }
        }
    });

    let reply = server
        .handle(&request.to_string(), Some(tx), None)
        .await
        .expect("call succeeds");
    let Reply::Message(response) = reply else {
        panic!("expected response message");
    };
    let response: Value = serde_json::from_str(&response).expect("JSON");
    assert_eq!(response["result"]["structuredContent"]["result"], 20.0);

    for expected in [0.1, 0.4, 0.7] {
        let frame = rx.try_recv().expect("progress frame should be queued");
        let frame: Value = serde_json::from_str(&frame).expect("JSON");
        assert_eq!(frame["method"], "notifications/progress");
        assert_eq!(frame["params"]["progressToken"], "tok-21");
        assert_eq!(frame["params"]["progress"], expected);
    }
    assert!(rx.try_recv().is_err(), "no extra frames expected");
}

#[tokio::test]
async fn concurrent_calls_see_their_own_scope() {
    #[derive(Deserialize, JsonSchema)]
    struct WhoArgs {}

    let server = Arc::new(MiniMcp::builder("scoped-server").build());
    server
        .tools
        .add("whoami", ToolOptions::default(), |_args: WhoArgs| async move {
            let scope: Arc<String> = Context::current()?.scope()?;
            Ok(Json(scope.as_ref().clone()))
        })
        .expect("registers");

    let mut handles = Vec::new();
    for user in ["ada", "grace", "edsger"] {
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            let request = json!({
                "jsonrpc": "2.0",
                "id": user,
                "method": "tools/call",
                "params": { "name": "whoami", "arguments": {} }
            });
            let reply = server
                .handle(
                    &request.to_string(),
                    None,
                    Some(Arc::new(user.to_string()) as minimcp_server::Scope),
                )
                .await
                .expect("call succeeds");
            let Reply::Message(response) = reply else {
                panic!("expected response message");
            };
            let response: Value = serde_json::from_str(&response).expect("JSON");
            (user, response)
        }));
    }

    for handle in handles {
        let (user, response) = handle.await.expect("task should not panic");
        assert_eq!(response["id"], user);
        assert_eq!(response["result"]["structuredContent"]["result"], user);
    }
}

#[tokio::test(start_paused = true)]
async fn idle_handlers_time_out_to_internal_error() {
    #[derive(Deserialize, JsonSchema)]
    struct SleepArgs {}

    let server = MiniMcp::builder("sleepy-server")
        .idle_timeout(Duration::from_secs(1))
        .build();
    server
        .tools
        .add("sleep", ToolOptions::default(), |_args: SleepArgs| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Json(0.0))
        })
        .expect("registers");

    let response = roundtrip(
        &server,
        request(31, "tools/call", json!({ "name": "sleep", "arguments": {} })),
    )
    .await;

    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["data"]["timeoutSeconds"], 1);
}

#[tokio::test]
async fn stack_traces_only_appear_when_enabled() {
    let bare = MiniMcp::builder("bare").build();
    let err = bare.handle("nope", None, None).await.expect_err("parse error");
    let frame: Value = serde_json::from_str(&err.response).expect("JSON");
    assert!(frame["error"]["data"].get("stackTrace").is_none());

    let traced = MiniMcp::builder("traced").include_stack_trace(true).build();
    let err = traced.handle("nope", None, None).await.expect_err("parse error");
    let frame: Value = serde_json::from_str(&err.response).expect("JSON");
    assert!(frame["error"]["data"]["stackTrace"].is_string());
}
