//! Schema derivation and argument parsing shared by the three registries.
//!
//! Handlers declare a parameter struct deriving [`schemars::JsonSchema`] and
//! [`serde::Deserialize`]; the registry derives the advertised `inputSchema`
//! from it at registration time and funnels every invocation through
//! [`parse_args`], which coerces and validates the raw argument map before
//! the handler runs.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

pub type JsonObject = serde_json::Map<String, Value>;

/// JSON schema for a handler's parameter struct. Subschemas are inlined so
/// the advertised schema is self-contained, and generator bookkeeping keys
/// are stripped.
pub(crate) fn input_schema_for<A: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|settings| {
        settings.inline_subschemas = true;
    });
    let schema = settings.into_generator().into_root_schema_for::<A>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| Value::Object(JsonObject::new()));
    if let Value::Object(object) = &mut value {
        object.remove("$schema");
        object.remove("title");
        object.remove("definitions");
        if !object.contains_key("type") {
            object.insert("type".to_string(), Value::String("object".to_string()));
        }
    }
    value
}

/// Schema for a handler's return type, wrapped under a `result` property
/// when the type is not itself an object. The marker mirrors how the
/// wrapping is recorded so clients can unwrap scalar results.
pub(crate) fn output_schema_for<R: JsonSchema>() -> Value {
    let schema = input_schema_for::<R>();
    if schema_is_object(&schema) {
        schema
    } else {
        let mut properties = JsonObject::new();
        properties.insert("result".to_string(), schema);
        let mut wrapped = JsonObject::new();
        wrapped.insert("type".to_string(), Value::String("object".to_string()));
        wrapped.insert("properties".to_string(), Value::Object(properties));
        wrapped.insert(
            "required".to_string(),
            Value::Array(vec![Value::String("result".to_string())]),
        );
        wrapped.insert("x-wrapped-result".to_string(), Value::Bool(true));
        Value::Object(wrapped)
    }
}

pub(crate) fn schema_is_object(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("object")
}

/// Parameter names declared by a schema, in declaration-independent order.
pub(crate) fn schema_parameter_names(schema: &Value) -> BTreeSet<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| properties.keys().cloned().collect())
        .unwrap_or_default()
}

pub(crate) fn schema_required_names(schema: &Value) -> BTreeSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn schema_property_description(schema: &Value, name: &str) -> Option<String> {
    schema
        .get("properties")?
        .get(name)?
        .get("description")?
        .as_str()
        .map(str::to_string)
}

/// Best-effort JSON decoding of string-valued arguments for parameters whose
/// declared type is not `string`. Lets clients that can only transmit string
/// values (resource template captures, some tool callers) still hit typed
/// handlers; values that do not decode are passed through untouched and left
/// to validation.
pub(crate) fn pre_parse_json(schema: &Value, mut args: JsonObject) -> JsonObject {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return args;
    };

    for (name, value) in args.iter_mut() {
        let Some(property) = properties.get(name) else {
            continue;
        };
        if property.get("type").and_then(Value::as_str) == Some("string") {
            continue;
        }
        if let Value::String(text) = value
            && let Ok(decoded) = serde_json::from_str::<Value>(text)
            && !decoded.is_string()
        {
            *value = decoded;
        }
    }

    args
}

/// Coerces and validates `args` against the schema-declared parameter
/// struct. This is the single choke point every handler invocation goes
/// through.
pub(crate) fn parse_args<A: DeserializeOwned>(
    schema: &Value,
    args: Option<JsonObject>,
) -> Result<A, Error> {
    let args = pre_parse_json(schema, args.unwrap_or_default());
    serde_json::from_value(Value::Object(args)).map_err(|err| Error::InvalidParams(err.to_string()))
}

/// Lock helpers that survive poisoning: a panicking handler must not wedge
/// a registry for the rest of the process.
pub(crate) fn lock_read<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn lock_write<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Validates a name supplied at registration.
pub(crate) fn validate_name(name: &str, kind: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Primitive(format!("{kind} name must not be empty")));
    }
    Ok(name.to_string())
}
