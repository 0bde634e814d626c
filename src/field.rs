//! Typed form field values and their form-data string encoding.
//!
//! Arrays and maps encode to a compact, deterministic form that is *not*
//! JSON: `[a, 1.0, true]` and `{key=value, other=null}`. Strings inside
//! containers are not quoted.

use std::fmt::{self, Display, Write};

use serde_json::Value;
use tracing::debug;

use crate::error::UploadError;

/// A dynamically-typed field value supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<TypedValue>),
    /// Entries keep insertion order.
    Map(Vec<(String, TypedValue)>),
}

/// Encodes a value as the text sent in its form-data part.
pub fn encode(value: &TypedValue) -> String {
    match value {
        TypedValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Encodes every field, logging each one as it goes.
pub fn encode_fields(fields: &[(String, TypedValue)]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(key, value)| {
            let encoded = encode(value);
            debug!(key = %key, kind = value.kind(), value = %encoded, "encoded form field");
            (key.clone(), encoded)
        })
        .collect()
}

impl TypedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            TypedValue::Null => "null",
            TypedValue::Boolean(_) => "boolean",
            TypedValue::Number(_) => "number",
            TypedValue::String(_) => "string",
            TypedValue::Array(_) => "array",
            TypedValue::Map(_) => "map",
        }
    }

    /// Converts a JSON value, naming `key` in the error when a number has no f64 form.
    pub fn from_json(key: &str, value: Value) -> Result<Self, UploadError> {
        Ok(match value {
            Value::Null => TypedValue::Null,
            Value::Bool(flag) => TypedValue::Boolean(flag),
            Value::Number(number) => TypedValue::Number(number.as_f64().ok_or_else(|| {
                UploadError::type_conversion(key, format!("{number} is not representable as f64"))
            })?),
            Value::String(text) => TypedValue::String(text),
            Value::Array(items) => TypedValue::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| TypedValue::from_json(&format!("{key}[{index}]"), item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(entries) => TypedValue::Map(
                entries
                    .into_iter()
                    .map(|(name, item)| {
                        let nested = TypedValue::from_json(&format!("{key}.{name}"), item)?;
                        Ok((name, nested))
                    })
                    .collect::<Result<_, UploadError>>()?,
            ),
        })
    }
}

impl Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => f.write_str("null"),
            TypedValue::Boolean(flag) => write!(f, "{flag}"),
            // Debug keeps the fractional part of integral values ("1.0") and uses the
            // shortest round-trip digits otherwise.
            TypedValue::Number(number) => write!(f, "{number:?}"),
            TypedValue::String(text) => f.write_str(text),
            TypedValue::Array(items) => {
                f.write_char('[')?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            TypedValue::Map(entries) => {
                f.write_char('{')?;
                for (index, (name, item)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}={item}")?;
                }
                f.write_char('}')
            }
        }
    }
}

impl From<bool> for TypedValue {
    fn from(flag: bool) -> Self {
        TypedValue::Boolean(flag)
    }
}

impl From<f64> for TypedValue {
    fn from(number: f64) -> Self {
        TypedValue::Number(number)
    }
}

impl From<i32> for TypedValue {
    fn from(number: i32) -> Self {
        TypedValue::Number(f64::from(number))
    }
}

impl From<&str> for TypedValue {
    fn from(text: &str) -> Self {
        TypedValue::String(text.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(text: String) -> Self {
        TypedValue::String(text)
    }
}
