//! Tool registration and `tools/call` dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use minimcp_protocol::CallToolResult;
use minimcp_protocol::ContentBlock;
use minimcp_protocol::Tool;
use minimcp_protocol::ToolAnnotations;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::handler::JsonObject;
use crate::handler::input_schema_for;
use crate::handler::lock_read;
use crate::handler::lock_write;
use crate::handler::output_schema_for;
use crate::handler::parse_args;
use crate::handler::validate_name;

/// Typed return wrapper: the value is serialized as the structured content
/// of the call result and its JSON schema is advertised as the tool's
/// `outputSchema`. Non-object values are wrapped under a `result` property.
pub struct Json<T>(pub T);

/// Normalised shape of a tool handler's return value.
pub enum ToolReturn {
    /// Unstructured content only.
    Content(Vec<ContentBlock>),
    /// Structured content; `display` is what gets pretty-printed into the
    /// accompanying text block (the unwrapped value for scalar results).
    Structured { structured: JsonObject, display: Value },
    /// Explicit pair of content and structured output.
    Both(Vec<ContentBlock>, JsonObject),
}

pub trait IntoToolReturn {
    fn output_schema() -> Option<Value>
    where
        Self: Sized,
    {
        None
    }

    fn into_tool_return(self) -> Result<ToolReturn, Error>;
}

impl IntoToolReturn for ToolReturn {
    fn into_tool_return(self) -> Result<ToolReturn, Error> {
        Ok(self)
    }
}

impl IntoToolReturn for Vec<ContentBlock> {
    fn into_tool_return(self) -> Result<ToolReturn, Error> {
        Ok(ToolReturn::Content(self))
    }
}

impl IntoToolReturn for ContentBlock {
    fn into_tool_return(self) -> Result<ToolReturn, Error> {
        Ok(ToolReturn::Content(vec![self]))
    }
}

impl IntoToolReturn for JsonObject {
    fn into_tool_return(self) -> Result<ToolReturn, Error> {
        let display = Value::Object(self.clone());
        Ok(ToolReturn::Structured {
            structured: self,
            display,
        })
    }
}

impl IntoToolReturn for Value {
    fn into_tool_return(self) -> Result<ToolReturn, Error> {
        match self {
            Value::Object(object) => object.into_tool_return(),
            other => Err(Error::Runtime(format!(
                "unexpected tool return type: {other}"
            ))),
        }
    }
}

impl IntoToolReturn for (Vec<ContentBlock>, JsonObject) {
    fn into_tool_return(self) -> Result<ToolReturn, Error> {
        Ok(ToolReturn::Both(self.0, self.1))
    }
}

impl<T: Serialize + JsonSchema> IntoToolReturn for Json<T> {
    fn output_schema() -> Option<Value> {
        Some(output_schema_for::<T>())
    }

    fn into_tool_return(self) -> Result<ToolReturn, Error> {
        let value = serde_json::to_value(self.0)
            .map_err(|err| Error::Runtime(format!("failed to serialize tool result: {err}")))?;
        match value {
            Value::Object(object) => {
                let display = Value::Object(object.clone());
                Ok(ToolReturn::Structured {
                    structured: object,
                    display,
                })
            }
            other => {
                let mut structured = JsonObject::new();
                structured.insert("result".to_string(), other.clone());
                Ok(ToolReturn::Structured {
                    structured,
                    display: other,
                })
            }
        }
    }
}

#[derive(Default)]
pub struct ToolOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub annotations: Option<ToolAnnotations>,
    pub meta: Option<JsonObject>,
}

type ToolFuture = BoxFuture<'static, Result<ToolReturn, Error>>;
type ToolHandlerFn = Arc<dyn Fn(Option<JsonObject>) -> ToolFuture + Send + Sync>;

struct ToolEntry {
    tool: Tool,
    invoke: ToolHandlerFn,
    output_validator: Option<jsonschema::Validator>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<ToolEntry>>>,
}

impl ToolRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a typed tool handler. The input schema is derived from `A`
    /// and, when `R` is the [`Json`] wrapper, the output schema from its
    /// payload type.
    pub fn add<A, R, F, Fut>(
        &self,
        name: &str,
        options: ToolOptions,
        handler: F,
    ) -> Result<Tool, Error>
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        R: IntoToolReturn + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
    {
        let input_schema = Arc::new(input_schema_for::<A>());
        let handler = Arc::new(handler);
        let invoke: ToolHandlerFn = {
            let input_schema = input_schema.clone();
            Arc::new(move |args| {
                let input_schema = input_schema.clone();
                let handler = handler.clone();
                async move {
                    let parsed: A = parse_args(&input_schema, args)?;
                    handler(parsed)
                        .await
                        .and_then(IntoToolReturn::into_tool_return)
                }
                .boxed()
            })
        };

        self.insert(
            name,
            options,
            input_schema.as_ref().clone(),
            R::output_schema(),
            invoke,
        )
    }

    /// Registers a tool from explicit schemas and an untyped handler, for
    /// callers that build schemas at runtime. Arguments are passed through
    /// uncoerced; the handler owns their validation.
    pub fn add_with_schema<F, Fut>(
        &self,
        name: &str,
        options: ToolOptions,
        input_schema: Value,
        output_schema: Option<Value>,
        handler: F,
    ) -> Result<Tool, Error>
    where
        F: Fn(Option<JsonObject>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolReturn, Error>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let invoke: ToolHandlerFn =
            Arc::new(move |args| handler(args).boxed());
        self.insert(name, options, input_schema, output_schema, invoke)
    }

    fn insert(
        &self,
        name: &str,
        options: ToolOptions,
        input_schema: Value,
        output_schema: Option<Value>,
        invoke: ToolHandlerFn,
    ) -> Result<Tool, Error> {
        let name = validate_name(name, "tool")?;

        let output_validator = output_schema
            .as_ref()
            .map(|schema| {
                jsonschema::validator_for(schema).map_err(|err| {
                    Error::Primitive(format!("invalid output schema for tool {name}: {err}"))
                })
            })
            .transpose()?;

        let tool = Tool {
            name: name.clone(),
            title: options.title,
            description: options.description,
            input_schema,
            output_schema,
            annotations: options.annotations,
            meta: options.meta,
        };

        let mut tools = lock_write(&self.tools);
        if tools.contains_key(&name) {
            return Err(Error::Primitive(format!("Tool {name} already registered")));
        }
        tools.insert(
            name.clone(),
            Arc::new(ToolEntry {
                tool: tool.clone(),
                invoke,
                output_validator,
            }),
        );
        debug!(%name, "tool added");

        Ok(tool)
    }

    pub fn remove(&self, name: &str) -> Result<Tool, Error> {
        let mut tools = lock_write(&self.tools);
        let entry = tools
            .remove(name)
            .ok_or_else(|| Error::Primitive(format!("Tool {name} not found")))?;
        debug!(name, "tool removed");
        Ok(entry.tool.clone())
    }

    pub fn list(&self) -> Vec<Tool> {
        lock_read(&self.tools)
            .values()
            .map(|entry| entry.tool.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        lock_read(&self.tools).is_empty()
    }

    /// Dispatches one `tools/call`. Handler failures come back as an
    /// `isError` result so the outer JSON-RPC exchange still succeeds;
    /// argument validation failures surface as INVALID_PARAMS.
    pub async fn call(&self, name: &str, args: Option<JsonObject>) -> Result<CallToolResult, Error> {
        let entry = lock_read(&self.tools)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Primitive(format!("Tool {name} not found")))?;

        let returned = match (entry.invoke)(args).await {
            Ok(returned) => returned,
            Err(Error::InvalidParams(message)) => {
                return Err(Error::InvalidParams(format!(
                    "invalid arguments for tool {name}: {message}"
                )));
            }
            Err(err) => {
                warn!(name, error = %err, "tool handler failed");
                return Ok(error_result(format!("Error calling tool {name}: {err}")));
            }
        };
        debug!(name, "tool handled");

        let (content, structured) = match returned {
            ToolReturn::Content(content) => (content, None),
            ToolReturn::Structured {
                structured,
                display,
            } => {
                let text = serde_json::to_string_pretty(&display)
                    .unwrap_or_else(|_| display.to_string());
                (vec![ContentBlock::text(text)], Some(structured))
            }
            ToolReturn::Both(content, structured) => (content, Some(structured)),
        };

        if let Some(validator) = &entry.output_validator {
            let Some(structured) = &structured else {
                return Ok(error_result(format!(
                    "Tool {name} declares an output schema but returned no structured content"
                )));
            };
            let structured = Value::Object(structured.clone());
            if let Err(err) = validator.validate(&structured) {
                return Ok(error_result(format!(
                    "Output validation error for tool {name}: {err}"
                )));
            }
        }

        Ok(CallToolResult {
            content,
            structured_content: structured.map(Value::Object),
            is_error: Some(false),
        })
    }
}

fn error_result(message: String) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::text(message)],
        structured_content: None,
        is_error: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize, JsonSchema)]
    struct MathArgs {
        a: f64,
        b: f64,
    }

    fn math_registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry
            .add(
                "add",
                ToolOptions {
                    description: Some("Add two numbers".to_string()),
                    ..Default::default()
                },
                |args: MathArgs| async move { Ok(Json(args.a + args.b)) },
            )
            .expect("add registers");
        registry
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
        registry
    }

    fn args(value: serde_json::Value) -> Option<JsonObject> {
        value.as_object().cloned()
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = math_registry();
        let err = registry
            .add("add", ToolOptions::default(), |args: MathArgs| async move {
                Ok(Json(args.a))
            })
            .expect_err("duplicate should fail");
        assert!(matches!(err, Error::Primitive(_)));
    }

    #[test]
    fn remove_then_list_omits_the_tool() {
        let registry = math_registry();
        assert_eq!(registry.list().len(), 2);
        registry.remove("divide").expect("divide exists");
        let names: Vec<String> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["add".to_string()]);
        assert!(matches!(
            registry.remove("divide"),
            Err(Error::Primitive(_))
        ));
    }

    #[test]
    fn typed_tools_advertise_derived_schemas() {
        let registry = math_registry();
        let tool = registry
            .list()
            .into_iter()
            .find(|tool| tool.name == "add")
            .expect("add is listed");
        assert!(tool.input_schema.pointer("/properties/a").is_some());
        let output_schema = tool.output_schema.expect("output schema derived");
        assert_eq!(output_schema.get("x-wrapped-result"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn call_returns_structured_and_text_content() {
        let registry = math_registry();
        let result = registry
            .call("add", args(json!({ "a": 5, "b": 3 })))
            .await
            .expect("call succeeds");

        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.structured_content, Some(json!({ "result": 8.0 })));
        let ContentBlock::Text(text) = &result.content[0] else {
            panic!("expected text content");
        };
        assert_eq!(text.text, "8.0");
    }

    #[tokio::test]
    async fn handler_errors_become_is_error_results() {
        let registry = math_registry();
        let result = registry
            .call("divide", args(json!({ "a": 10, "b": 0 })))
            .await
            .expect("outer call still succeeds");

        assert_eq!(result.is_error, Some(true));
        let ContentBlock::Text(text) = &result.content[0] else {
            panic!("expected text content");
        };
        assert!(text.text.contains("divide by zero"));
    }

    #[tokio::test]
    async fn unknown_tools_fail_the_rpc_call() {
        let registry = math_registry();
        let err = registry
            .call("multiply", args(json!({ "a": 1, "b": 2 })))
            .await
            .expect_err("unknown tool");
        assert!(matches!(err, Error::Primitive(_)));
    }

    #[tokio::test]
    async fn invalid_arguments_fail_the_rpc_call() {
        let registry = math_registry();
        let err = registry
            .call("add", args(json!({ "a": 5 })))
            .await
            .expect_err("missing argument");
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[tokio::test]
    async fn string_arguments_are_coerced_to_numbers() {
        let registry = math_registry();
        let result = registry
            .call("add", args(json!({ "a": "5", "b": "3" })))
            .await
            .expect("call succeeds");
        assert_eq!(result.structured_content, Some(json!({ "result": 8.0 })));
    }

    #[tokio::test]
    async fn output_schema_violations_become_is_error_results() {
        let registry = ToolRegistry::new();
        registry
            .add_with_schema(
                "shape",
                ToolOptions::default(),
                json!({ "type": "object" }),
                Some(json!({
                    "type": "object",
                    "properties": { "count": { "type": "integer" } },
                    "required": ["count"]
                })),
                |_args| async move {
                    let mut object = JsonObject::new();
                    object.insert("count".to_string(), json!("not-a-number"));
                    Ok(ToolReturn::Structured {
                        display: Value::Object(object.clone()),
                        structured: object,
                    })
                },
            )
            .expect("registers");

        let result = registry.call("shape", None).await.expect("call returns");
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn missing_structured_content_with_output_schema_is_an_error_result() {
        let registry = ToolRegistry::new();
        registry
            .add_with_schema(
                "content-only",
                ToolOptions::default(),
                json!({ "type": "object" }),
                Some(json!({ "type": "object" })),
                |_args| async move { Ok(ToolReturn::Content(vec![ContentBlock::text("hi")])) },
            )
            .expect("registers");

        let result = registry
            .call("content-only", None)
            .await
            .expect("call returns");
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn pair_returns_carry_both_content_and_structured() {
        let registry = ToolRegistry::new();
        registry
            .add(
                "both",
                ToolOptions::default(),
                |_args: MathArgs| async move {
                    let mut structured = JsonObject::new();
                    structured.insert("sum".to_string(), json!(8.0));
                    Ok((vec![ContentBlock::text("eight")], structured))
                },
            )
            .expect("registers");

        let result = registry
            .call("both", args(json!({ "a": 5, "b": 3 })))
            .await
            .expect("call succeeds");
        assert_eq!(result.structured_content, Some(json!({ "sum": 8.0 })));
        let ContentBlock::Text(text) = &result.content[0] else {
            panic!("expected text content");
        };
        assert_eq!(text.text, "eight");
    }
}
