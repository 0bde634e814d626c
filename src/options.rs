//! The options object a host passes for one upload:
//!
//! ```json
//! {
//!   "fileKey": "photo",
//!   "uri": "file:///data/cache/cat.png",
//!   "uploadUrl": "https://example.com/upload",
//!   "mimeType": "image/png",
//!   "fileName": "cat.png",
//!   "headers": { "Authorization": "Bearer ..." },
//!   "data": { "caption": "hello", "width": 640 }
//! }
//! ```

use std::path::PathBuf;

use serde_json::{Map, Value};
use url::Url;

use crate::{error::UploadError, field::TypedValue, request::UploadRequest};

/// Maps a host URI to a local file path.
pub trait UriResolver {
    fn resolve(&self, uri: &str) -> Result<PathBuf, UploadError>;
}

/// Accepts `file://` URIs and plain paths. For any other scheme the URI's path
/// component is used as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileUriResolver;

impl UriResolver for FileUriResolver {
    fn resolve(&self, uri: &str) -> Result<PathBuf, UploadError> {
        match Url::parse(uri) {
            // Single-letter schemes are Windows drive letters.
            Ok(url) if url.scheme().len() == 1 => Ok(PathBuf::from(uri)),
            Ok(url) if url.scheme() == "file" => url.to_file_path().map_err(|_| {
                UploadError::type_conversion("uri", format!("`{uri}` is not a local file URI"))
            }),
            Ok(url) => Ok(PathBuf::from(url.path())),
            Err(_) => Ok(PathBuf::from(uri)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub file_key: String,
    pub uri: String,
    pub upload_url: String,
    pub mime_type: String,
    pub file_name: String,
    pub headers: Vec<(String, String)>,
    pub data: Vec<(String, TypedValue)>,
}

impl UploadOptions {
    pub fn from_value(value: Value) -> Result<Self, UploadError> {
        let mut options = match value {
            Value::Object(options) => options,
            other => {
                return Err(UploadError::type_conversion(
                    "options",
                    format!("expected an object, found {}", json_kind(&other)),
                ));
            }
        };

        let headers: Vec<(String, String)> = optional_object(&mut options, "headers")?
            .into_iter()
            .map(|(name, value)| match value {
                Value::String(text) => Ok((name, text)),
                other => Err(UploadError::type_conversion(
                    format!("headers.{name}"),
                    format!("expected a string, found {}", json_kind(&other)),
                )),
            })
            .collect::<Result<_, UploadError>>()?;

        let data: Vec<(String, TypedValue)> = optional_object(&mut options, "data")?
            .into_iter()
            .map(|(name, value)| {
                let value = TypedValue::from_json(&format!("data.{name}"), value)?;
                Ok((name, value))
            })
            .collect::<Result<_, UploadError>>()?;

        Ok(Self {
            file_key: required_string(&mut options, "fileKey")?,
            uri: required_string(&mut options, "uri")?,
            upload_url: required_string(&mut options, "uploadUrl")?,
            mime_type: required_string(&mut options, "mimeType")?,
            file_name: required_string(&mut options, "fileName")?,
            headers,
            data,
        })
    }

    pub fn into_request(self, resolver: &impl UriResolver) -> Result<UploadRequest, UploadError> {
        let file_path = resolver.resolve(&self.uri)?;

        let mut builder = UploadRequest::builder(self.upload_url, file_path)
            .file_field(self.file_key)
            .mime_type(self.mime_type)
            .file_name(self.file_name);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        for (name, value) in self.data {
            builder = builder.field(name, value);
        }
        builder.build()
    }
}

fn required_string(options: &mut Map<String, Value>, key: &str) -> Result<String, UploadError> {
    match options.remove(key) {
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(UploadError::type_conversion(
            key,
            format!("expected a string, found {}", json_kind(&other)),
        )),
        None => Err(UploadError::type_conversion(key, "missing")),
    }
}

fn optional_object(
    options: &mut Map<String, Value>,
    key: &str,
) -> Result<Map<String, Value>, UploadError> {
    match options.remove(key) {
        Some(Value::Object(entries)) => Ok(entries),
        Some(Value::Null) | None => Ok(Map::new()),
        Some(other) => Err(UploadError::type_conversion(
            key,
            format!("expected an object, found {}", json_kind(&other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
