//! `multipart/form-data` body plan.
//!
//! [`MultipartBody`] decides which parts are sent and in which order. The wire
//! layout (boundary, part headers, length) is left to [`reqwest::multipart::Form`]:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="file"; filename="photo.jpg"\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <file bytes>\r\n
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="filename"\r\n
//! \r\n
//! photo.jpg\r\n
//! --<boundary>--\r\n
//! ```
//!
//! File parts are streamed from disk, never held in memory.

use std::{io, path::PathBuf};

use mime_guess::Mime;
use reqwest::{
    Body,
    multipart::{Form, Part},
};
use tokio_util::io::ReaderStream;

use crate::error::UploadError;
use crate::field::{TypedValue, encode_fields};

/// The local file streamed into the file part.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    /// `None` when the size cannot be determined up front.
    pub len: Option<u64>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, len: Option<u64>) -> Self {
        Self {
            path: path.into(),
            len,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PartContent {
    Text(String),
    File {
        source: FileSource,
        file_name: String,
        mime_type: Mime,
    },
}

#[derive(Debug, Clone)]
pub struct MultipartPart {
    name: String,
    content: PartContent,
}

impl MultipartPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Text(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: Mime,
        source: FileSource,
    ) -> Self {
        Self {
            name: name.into(),
            content: PartContent::File {
                source,
                file_name: file_name.into(),
                mime_type,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &PartContent {
        &self.content
    }
}

/// The ordered parts of one upload body.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    parts: Vec<MultipartPart>,
}

impl MultipartBody {
    /// Lays out the file part, the redundant `filename` field, then one part per field.
    pub fn build(
        file_field: &str,
        file: FileSource,
        file_name: &str,
        mime_type: &Mime,
        fields: &[(String, TypedValue)],
    ) -> Self {
        let mut body = Self::new();
        body.push(MultipartPart::file(file_field, file_name, mime_type.clone(), file));
        // Existing servers read the name from this field, not from the disposition.
        body.push(MultipartPart::text("filename", file_name));
        for (key, value) in encode_fields(fields) {
            body.push(MultipartPart::text(key, value));
        }
        body
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, part: MultipartPart) {
        self.parts.push(part);
    }

    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    /// Opens the file parts and assembles the form. The form picks a fresh boundary.
    ///
    /// Names are escaped here and passed through unencoded, so a name with
    /// spaces or non-ASCII text stays a plain quoted parameter.
    pub async fn into_form(self) -> Result<Form, UploadError> {
        let mut form = Form::new().percent_encode_noop();
        for part in self.parts {
            let name = quote(&part.name);
            form = match part.content {
                PartContent::Text(value) => form.text(name, value),
                PartContent::File {
                    source,
                    file_name,
                    mime_type,
                } => form.part(name, file_part(source, &file_name, &mime_type).await?),
            };
        }
        Ok(form)
    }
}

async fn file_part(source: FileSource, file_name: &str, mime_type: &Mime) -> Result<Part, UploadError> {
    let file = match tokio::fs::File::open(&source.path).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(UploadError::FileNotFound(source.path));
        }
        Err(err) => return Err(err.into()),
    };

    let body = Body::wrap_stream(ReaderStream::new(file));
    let part = match source.len {
        Some(len) => Part::stream_with_length(body, len),
        None => Part::stream(body),
    };
    part.file_name(quote(file_name))
        .mime_str(mime_type.as_ref())
        .map_err(|err| UploadError::type_conversion("mimeType", err.to_string()))
}

/// Escapes a quoted header parameter the way browsers do.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("%22"),
            '\r' => quoted.push_str("%0D"),
            '\n' => quoted.push_str("%0A"),
            other => quoted.push(other),
        }
    }
    quoted
}
