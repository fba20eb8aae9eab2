//! Resource registration, URI template matching and `resources/read`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::RwLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::FutureExt;
use futures::future::BoxFuture;
use minimcp_protocol::Annotations;
use minimcp_protocol::BlobResourceContents;
use minimcp_protocol::Resource;
use minimcp_protocol::ResourceContents;
use minimcp_protocol::ResourceTemplate;
use minimcp_protocol::TextResourceContents;
use regex::Regex;
use schemars::JsonSchema;
use serde::Serialize;
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
use crate::handler::validate_name;

const MIME_TEXT: &str = "text/plain";
const MIME_BINARY: &str = "application/octet-stream";

/// Sentinel that replaces `{param}` placeholders when normalising a URI, so
/// templates differing only in parameter names collide.
const NORMALIZE_SENTINEL: &str = "|";

/// What a resource handler may produce. Bytes become a base64 blob, text
/// stays text, anything else is JSON-pretty-printed text.
pub enum ResourceReturn {
    Bytes(Vec<u8>),
    Text(String),
    Value(Value),
}

pub trait IntoResourceReturn {
    fn into_resource_return(self) -> Result<ResourceReturn, Error>;
}

impl IntoResourceReturn for ResourceReturn {
    fn into_resource_return(self) -> Result<ResourceReturn, Error> {
        Ok(self)
    }
}

impl IntoResourceReturn for Vec<u8> {
    fn into_resource_return(self) -> Result<ResourceReturn, Error> {
        Ok(ResourceReturn::Bytes(self))
    }
}

impl IntoResourceReturn for String {
    fn into_resource_return(self) -> Result<ResourceReturn, Error> {
        Ok(ResourceReturn::Text(self))
    }
}

impl IntoResourceReturn for &str {
    fn into_resource_return(self) -> Result<ResourceReturn, Error> {
        Ok(ResourceReturn::Text(self.to_string()))
    }
}

impl IntoResourceReturn for Value {
    fn into_resource_return(self) -> Result<ResourceReturn, Error> {
        Ok(ResourceReturn::Value(self))
    }
}

/// Serializes any other structured value through JSON.
pub struct Structured<T>(pub T);

impl<T: Serialize> IntoResourceReturn for Structured<T> {
    fn into_resource_return(self) -> Result<ResourceReturn, Error> {
        serde_json::to_value(self.0)
            .map(ResourceReturn::Value)
            .map_err(|err| Error::Runtime(format!("failed to serialize resource: {err}")))
    }
}

#[derive(Default)]
pub struct ResourceOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub annotations: Option<Annotations>,
    pub meta: Option<JsonObject>,
}

#[derive(Clone, Debug)]
pub enum ResourceKind {
    Static(Resource),
    Template(ResourceTemplate),
}

impl ResourceKind {
    fn name(&self) -> &str {
        match self {
            ResourceKind::Static(resource) => &resource.name,
            ResourceKind::Template(template) => &template.name,
        }
    }

    fn mime_type(&self) -> Option<&str> {
        match self {
            ResourceKind::Static(resource) => resource.mime_type.as_deref(),
            ResourceKind::Template(template) => template.mime_type.as_deref(),
        }
    }
}

type ResourceFuture = BoxFuture<'static, Result<ResourceReturn, Error>>;
type ResourceHandlerFn = Arc<dyn Fn(Option<JsonObject>) -> ResourceFuture + Send + Sync>;

struct ResourceEntry {
    kind: ResourceKind,
    invoke: ResourceHandlerFn,
    normalized_uri: String,
    /// Present for templates only: each `{name}` compiled to a named capture
    /// matching one path segment, fully anchored.
    uri_pattern: Option<Regex>,
}

/// Registered resources and templates, in registration order: `read` matches
/// statics exactly first, then templates first-match-wins.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: RwLock<Vec<Arc<ResourceEntry>>>,
}

impl ResourceRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a resource (no URI parameters) or a resource template. The
    /// URI parameter set must equal the handler's parameter set.
    pub fn add<A, R, F, Fut>(
        &self,
        name: &str,
        uri: &str,
        options: ResourceOptions,
        handler: F,
    ) -> Result<ResourceKind, Error>
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        R: IntoResourceReturn + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
    {
        if uri.is_empty() {
            return Err(Error::Primitive("resource URI must not be empty".to_string()));
        }
        let name = validate_name(name, "resource")?;

        let input_schema = Arc::new(input_schema_for::<A>());
        let uri_params = template_params(uri);
        let handler_params = schema_parameter_names(&input_schema);
        if uri_params != handler_params {
            return Err(Error::Primitive(format!(
                "mismatch between URI parameters {uri_params:?} and handler parameters {handler_params:?}"
            )));
        }

        let normalized_uri = normalize_uri(uri);
        let is_template = !uri_params.is_empty();

        let kind = if is_template {
            ResourceKind::Template(ResourceTemplate {
                name: name.clone(),
                title: options.title,
                uri_template: uri.to_string(),
                description: options.description,
                mime_type: options.mime_type,
                annotations: options.annotations,
                meta: options.meta,
            })
        } else {
            ResourceKind::Static(Resource {
                name: name.clone(),
                title: options.title,
                uri: uri.to_string(),
                description: options.description,
                mime_type: options.mime_type,
                annotations: options.annotations,
                meta: options.meta,
            })
        };

        let handler = Arc::new(handler);
        let invoke: ResourceHandlerFn = {
            let input_schema = input_schema.clone();
            Arc::new(move |args| {
                let input_schema = input_schema.clone();
                let handler = handler.clone();
                async move {
                    let parsed: A = parse_args(&input_schema, args)?;
                    handler(parsed)
                        .await
                        .and_then(IntoResourceReturn::into_resource_return)
                }
                .boxed()
            })
        };

        let uri_pattern = if is_template {
            Some(uri_to_pattern(uri)?)
        } else {
            None
        };

        let mut entries = lock_write(&self.entries);
        if entries.iter().any(|entry| entry.kind.name() == name) {
            return Err(Error::Primitive(format!(
                "Resource {name} already registered"
            )));
        }
        if let Some(existing) = entries
            .iter()
            .find(|entry| entry.normalized_uri == normalized_uri)
        {
            return Err(Error::Primitive(format!(
                "Resource {uri} already registered under the name {}",
                existing.kind.name()
            )));
        }
        entries.push(Arc::new(ResourceEntry {
            kind: kind.clone(),
            invoke,
            normalized_uri,
            uri_pattern,
        }));
        debug!(%name, uri, "resource added");

        Ok(kind)
    }

    pub fn remove(&self, name: &str) -> Result<ResourceKind, Error> {
        let mut entries = lock_write(&self.entries);
        let position = entries
            .iter()
            .position(|entry| entry.kind.name() == name)
            .ok_or_else(|| Error::Primitive(format!("Resource {name} not found")))?;
        let entry = entries.remove(position);
        debug!(name, "resource removed");
        Ok(entry.kind.clone())
    }

    pub fn list(&self) -> Vec<Resource> {
        lock_read(&self.entries)
            .iter()
            .filter_map(|entry| match &entry.kind {
                ResourceKind::Static(resource) => Some(resource.clone()),
                ResourceKind::Template(_) => None,
            })
            .collect()
    }

    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        lock_read(&self.entries)
            .iter()
            .filter_map(|entry| match &entry.kind {
                ResourceKind::Template(template) => Some(template.clone()),
                ResourceKind::Static(_) => None,
            })
            .collect()
    }

    /// Resolves and reads one URI: exact match on static resources first,
    /// then the first template whose pattern matches, captures becoming the
    /// handler arguments.
    pub async fn read(&self, uri: &str) -> Result<Vec<ResourceContents>, Error> {
        let (entry, args) = self
            .find_match(uri)
            .ok_or_else(|| Error::ResourceNotFound { uri: uri.to_string() })?;

        self.read_entry(&entry, uri, args).await
    }

    /// Reads a resource directly by registered name, bypassing URI matching.
    pub async fn read_by_name(
        &self,
        name: &str,
        args: Option<JsonObject>,
    ) -> Result<Vec<ResourceContents>, Error> {
        let entry = lock_read(&self.entries)
            .iter()
            .find(|entry| entry.kind.name() == name)
            .cloned()
            .ok_or_else(|| Error::Primitive(format!("Resource {name} not found")))?;

        let uri = match &entry.kind {
            ResourceKind::Static(resource) => resource.uri.clone(),
            ResourceKind::Template(template) => template.uri_template.clone(),
        };
        self.read_entry(&entry, &uri, args).await
    }

    async fn read_entry(
        &self,
        entry: &ResourceEntry,
        uri: &str,
        args: Option<JsonObject>,
    ) -> Result<Vec<ResourceContents>, Error> {
        let name = entry.kind.name().to_string();
        let returned = (entry.invoke)(args)
            .await
            .map_err(|err| Error::Runtime(format!("Error reading resource {name}: {err}")))?;
        debug!(%name, uri, "resource read");

        let declared_mime = entry.kind.mime_type().map(str::to_string);
        Ok(vec![match returned {
            ResourceReturn::Bytes(bytes) => ResourceContents::Blob(BlobResourceContents {
                uri: uri.to_string(),
                mime_type: declared_mime.or_else(|| Some(MIME_BINARY.to_string())),
                blob: BASE64.encode(bytes),
            }),
            ResourceReturn::Text(text) => ResourceContents::Text(TextResourceContents {
                uri: uri.to_string(),
                mime_type: declared_mime.or_else(|| Some(MIME_TEXT.to_string())),
                text,
            }),
            ResourceReturn::Value(value) => ResourceContents::Text(TextResourceContents {
                uri: uri.to_string(),
                mime_type: declared_mime.or_else(|| Some(MIME_TEXT.to_string())),
                text: serde_json::to_string_pretty(&value)
                    .unwrap_or_else(|_| value.to_string()),
            }),
        }])
    }

    fn find_match(&self, uri: &str) -> Option<(Arc<ResourceEntry>, Option<JsonObject>)> {
        let entries = lock_read(&self.entries);

        if let Some(entry) = entries
            .iter()
            .find(|entry| entry.uri_pattern.is_none() && entry.normalized_uri == uri)
        {
            return Some((entry.clone(), None));
        }

        for entry in entries.iter() {
            let Some(pattern) = &entry.uri_pattern else {
                continue;
            };
            if let Some(captures) = pattern.captures(uri) {
                let mut args = JsonObject::new();
                for name in pattern.capture_names().flatten() {
                    if let Some(value) = captures.name(name) {
                        args.insert(name.to_string(), Value::String(value.as_str().to_string()));
                    }
                }
                return Some((entry.clone(), Some(args)));
            }
        }

        None
    }
}

fn template_params(uri: &str) -> BTreeSet<String> {
    template_param_regex()
        .captures_iter(uri)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn normalize_uri(uri: &str) -> String {
    template_param_regex()
        .replace_all(uri, NORMALIZE_SENTINEL)
        .into_owned()
}

/// Compiles `users/{id}` into `^users/(?P<id>[^/]+)$`, escaping every
/// literal character outside the placeholders.
fn uri_to_pattern(uri: &str) -> Result<Regex, Error> {
    let mut pattern = String::from("^");
    let mut last_end = 0;
    for captures in template_param_regex().captures_iter(uri) {
        let whole = captures.get(0).ok_or_else(|| {
            Error::Primitive(format!("invalid resource URI template: {uri}"))
        })?;
        let name = captures.get(1).ok_or_else(|| {
            Error::Primitive(format!("invalid resource URI template: {uri}"))
        })?;
        pattern.push_str(&regex::escape(&uri[last_end..whole.start()]));
        pattern.push_str(&format!("(?P<{}>[^/]+)", name.as_str()));
        last_end = whole.end();
    }
    pattern.push_str(&regex::escape(&uri[last_end..]));
    pattern.push('$');

    Regex::new(&pattern)
        .map_err(|err| Error::Primitive(format!("invalid resource URI template {uri}: {err}")))
}

fn template_param_regex() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"\{(\w+)\}").expect("template parameter pattern is valid")
    })
}
