//! Prompt registration and `prompts/get` dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use minimcp_protocol::ContentBlock;
use minimcp_protocol::GetPromptResult;
use minimcp_protocol::Prompt;
use minimcp_protocol::PromptArgument;
use minimcp_protocol::PromptMessage;
use minimcp_protocol::Role;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::handler::JsonObject;
use crate::handler::input_schema_for;
use crate::handler::lock_read;
use crate::handler::lock_write;
use crate::handler::parse_args;
use crate::handler::schema_parameter_names;
use crate::handler::schema_property_description;
use crate::handler::schema_required_names;
use crate::handler::validate_name;

/// Free-form prompt handler return. The conversion rules (in order): a
/// message is kept; a JSON object must validate as a message; a string
/// becomes a `user` text message; anything else is JSON-pretty-printed into
/// a `user` text message.
pub enum PromptReturn {
    Messages(Vec<PromptMessage>),
    Text(String),
    Value(Value),
}

pub trait IntoPromptReturn {
    fn into_prompt_return(self) -> PromptReturn;
}

impl IntoPromptReturn for PromptReturn {
    fn into_prompt_return(self) -> PromptReturn {
        self
    }
}

impl IntoPromptReturn for Vec<PromptMessage> {
    fn into_prompt_return(self) -> PromptReturn {
        PromptReturn::Messages(self)
    }
}

impl IntoPromptReturn for PromptMessage {
    fn into_prompt_return(self) -> PromptReturn {
        PromptReturn::Messages(vec![self])
    }
}

impl IntoPromptReturn for String {
    fn into_prompt_return(self) -> PromptReturn {
        PromptReturn::Text(self)
    }
}

impl IntoPromptReturn for &str {
    fn into_prompt_return(self) -> PromptReturn {
        PromptReturn::Text(self.to_string())
    }
}

impl IntoPromptReturn for Value {
    fn into_prompt_return(self) -> PromptReturn {
        PromptReturn::Value(self)
    }
}

#[derive(Default)]
pub struct PromptOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub meta: Option<JsonObject>,
}

type PromptFuture = BoxFuture<'static, Result<PromptReturn, Error>>;
type PromptHandlerFn = Arc<dyn Fn(Option<JsonObject>) -> PromptFuture + Send + Sync>;

struct PromptEntry {
    prompt: Prompt,
    invoke: PromptHandlerFn,
}

#[derive(Default)]
pub struct PromptRegistry {
    prompts: RwLock<HashMap<String, Arc<PromptEntry>>>,
}

impl PromptRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a typed prompt handler. Prompt arguments are derived from
    /// the parameter struct's schema: every property becomes an argument,
    /// required unless it has a default.
    pub fn add<A, R, F, Fut>(
        &self,
        name: &str,
        options: PromptOptions,
        handler: F,
    ) -> Result<Prompt, Error>
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        R: IntoPromptReturn + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
    {
        let name = validate_name(name, "prompt")?;
        let input_schema = Arc::new(input_schema_for::<A>());

        let handler = Arc::new(handler);
        let invoke: PromptHandlerFn = {
            let input_schema = input_schema.clone();
            Arc::new(move |args| {
                let input_schema = input_schema.clone();
                let handler = handler.clone();
                async move {
                    let parsed: A = parse_args(&input_schema, args)?;
                    handler(parsed)
                        .await
                        .map(IntoPromptReturn::into_prompt_return)
                }
                .boxed()
            })
        };

        let prompt = Prompt {
            name: name.clone(),
            title: options.title,
            description: options.description,
            arguments: derive_arguments(&input_schema),
            meta: options.meta,
        };

        let mut prompts = lock_write(&self.prompts);
        if prompts.contains_key(&name) {
            return Err(Error::Primitive(format!(
                "Prompt {name} already registered"
            )));
        }
        prompts.insert(
            name.clone(),
            Arc::new(PromptEntry {
                prompt: prompt.clone(),
                invoke,
            }),
        );
        debug!(%name, "prompt added");

        Ok(prompt)
    }

    pub fn remove(&self, name: &str) -> Result<Prompt, Error> {
        let mut prompts = lock_write(&self.prompts);
        let entry = prompts
            .remove(name)
            .ok_or_else(|| Error::Primitive(format!("Prompt {name} not found")))?;
        debug!(name, "prompt removed");
        Ok(entry.prompt.clone())
    }

    pub fn list(&self) -> Vec<Prompt> {
        lock_read(&self.prompts)
            .values()
            .map(|entry| entry.prompt.clone())
            .collect()
    }

    /// Dispatches one `prompts/get`. Handler failures surface as runtime
    /// errors at the RPC layer, unlike tools.
    pub async fn get(
        &self,
        name: &str,
        args: Option<JsonObject>,
    ) -> Result<GetPromptResult, Error> {
        let entry = lock_read(&self.prompts)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Primitive(format!("Prompt {name} not found")))?;

        let returned = (entry.invoke)(args)
            .await
            .map_err(|err| Error::Runtime(format!("Error getting prompt {name}: {err}")))?;
        let messages = convert_messages(returned)?;
        debug!(name, "prompt handled");

        Ok(GetPromptResult {
            description: entry.prompt.description.clone(),
            messages,
            meta: entry.prompt.meta.clone(),
        })
    }
}

fn derive_arguments(schema: &Value) -> Option<Vec<PromptArgument>> {
    let names = schema_parameter_names(schema);
    if names.is_empty() {
        return None;
    }
    let required = schema_required_names(schema);
    Some(
        names
            .into_iter()
            .map(|name| PromptArgument {
                description: schema_property_description(schema, &name),
                required: Some(required.contains(&name)),
                name,
            })
            .collect(),
    )
}

fn convert_messages(returned: PromptReturn) -> Result<Vec<PromptMessage>, Error> {
    match returned {
        PromptReturn::Messages(messages) => Ok(messages),
        PromptReturn::Text(text) => Ok(vec![user_text_message(text)]),
        PromptReturn::Value(value) => {
            let items = match value {
                Value::Array(items) => items,
                other => vec![other],
            };
            items.into_iter().map(convert_one).collect()
        }
    }
}

fn convert_one(value: Value) -> Result<PromptMessage, Error> {
    match value {
        Value::Object(_) => serde_json::from_value(value).map_err(|_| {
            Error::Runtime("Could not convert prompt result to message".to_string())
        }),
        Value::String(text) => Ok(user_text_message(text)),
        other => {
            let text =
                serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string());
            Ok(user_text_message(text))
        }
    }
}

fn user_text_message(text: String) -> PromptMessage {
    PromptMessage {
        role: Role::User,
        content: ContentBlock::text(text),
    }
}
