//! Plain HTTP transport: header validation, status codes and bodies.

mod common;

use http::HeaderMap;
use http::HeaderValue;
use http::Method;
use minimcp_transport::HttpBody;
use minimcp_transport::HttpResult;
use minimcp_transport::HttpTransport;
use minimcp_transport::MCP_PROTOCOL_VERSION_HEADER;
use pretty_assertions::assert_eq;
use serde_json::Value;

use common::call_tool_body;
use common::initialize_body;
use common::math_server;

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("accept", HeaderValue::from_static("application/json"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers
}

fn body_json(result: &HttpResult) -> Value {
    let HttpBody::Message(message) = &result.body else {
        panic!("expected a message body");
    };
    serde_json::from_str(message).expect("body should be JSON")
}

#[tokio::test]
async fn post_with_valid_headers_returns_200_json() {
    let server = math_server();
    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &json_headers(),
        &call_tool_body(1, "add", 5.0, 3.0, None),
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::OK);
    assert_eq!(result.media_type, Some("application/json"));
    let body = body_json(&result);
    assert_eq!(body["result"]["structuredContent"]["result"], 8.0);
}

#[tokio::test]
async fn non_post_methods_get_405_with_allow_header() {
    let server = math_server();
    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let result = HttpTransport::dispatch(
            &server,
            &method,
            &json_headers(),
            "",
            None,
        )
        .await;
        assert_eq!(result.status, http::StatusCode::METHOD_NOT_ALLOWED);
        assert!(result.headers.contains(&("Allow", "POST")));
    }
}

#[tokio::test]
async fn missing_json_accept_is_406_with_invalid_request_body() {
    let server = math_server();
    let mut headers = json_headers();
    headers.insert("accept", HeaderValue::from_static("text/plain"));

    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &headers,
        &call_tool_body(1, "add", 1.0, 2.0, None),
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::NOT_ACCEPTABLE);
    let body = body_json(&result);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn accept_is_validated_before_content_type() {
    let server = math_server();
    let mut headers = HeaderMap::new();
    // Both headers are wrong; the Accept failure (406) must win over the
    // Content-Type failure (415).
    headers.insert("accept", HeaderValue::from_static("text/plain"));
    headers.insert("content-type", HeaderValue::from_static("text/plain"));

    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &headers,
        &call_tool_body(1, "add", 1.0, 2.0, None),
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn wrong_content_type_is_415() {
    let server = math_server();
    let mut headers = json_headers();
    headers.insert("content-type", HeaderValue::from_static("text/plain"));

    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &headers,
        &call_tool_body(1, "add", 1.0, 2.0, None),
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn content_type_parameters_are_ignored() {
    let server = math_server();
    let mut headers = json_headers();
    headers.insert(
        "content-type",
        HeaderValue::from_static("Application/JSON; charset=utf-8"),
    );

    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &headers,
        &call_tool_body(1, "add", 5.0, 3.0, None),
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::OK);
}

#[tokio::test]
async fn unsupported_protocol_version_is_400() {
    let server = math_server();
    let mut headers = json_headers();
    headers.insert(
        MCP_PROTOCOL_VERSION_HEADER,
        HeaderValue::from_static("1999-01-01"),
    );

    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &headers,
        &call_tool_body(1, "add", 1.0, 2.0, None),
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::BAD_REQUEST);
    let body = body_json(&result);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn initialize_skips_protocol_version_validation() {
    let server = math_server();
    let mut headers = json_headers();
    headers.insert(
        MCP_PROTOCOL_VERSION_HEADER,
        HeaderValue::from_static("1999-01-01"),
    );

    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &headers,
        &initialize_body(1),
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::OK);
}

#[tokio::test]
async fn missing_protocol_version_header_uses_the_default() {
    let server = math_server();

    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &json_headers(),
        &call_tool_body(1, "add", 5.0, 3.0, None),
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::OK);
}

#[tokio::test]
async fn notifications_are_202_with_no_body() {
    let server = math_server();
    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &json_headers(),
        r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#,
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::ACCEPTED);
    assert!(matches!(result.body, HttpBody::Empty));
}

#[tokio::test]
async fn malformed_json_is_400_with_parse_error_body() {
    let server = math_server();
    let result = HttpTransport::dispatch(
        &server,
        &Method::POST,
        &json_headers(),
        "{ not json",
        None,
    )
    .await;

    assert_eq!(result.status, http::StatusCode::BAD_REQUEST);
    let body = body_json(&result);
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], "no-id");
}
