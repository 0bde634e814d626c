use std::path::{Path, PathBuf};

use mime_guess::Mime;

use crate::{error::UploadError, field::TypedValue};

pub const DEFAULT_FILE_FIELD: &str = "file";

/// Everything one upload call needs. Built once through [`UploadRequestBuilder`]
/// and consumed by [`crate::UploadClient::upload`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    file_field: String,
    file_path: PathBuf,
    destination_url: String,
    mime_type: Mime,
    file_name: String,
    headers: Vec<(String, String)>,
    fields: Vec<(String, TypedValue)>,
}

impl UploadRequest {
    pub fn builder(
        destination_url: impl Into<String>,
        file_path: impl Into<PathBuf>,
    ) -> UploadRequestBuilder {
        UploadRequestBuilder {
            destination_url: destination_url.into(),
            file_path: file_path.into(),
            file_field: None,
            mime_type: None,
            file_name: None,
            headers: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn file_field(&self) -> &str {
        &self.file_field
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn destination_url(&self) -> &str {
        &self.destination_url
    }

    pub fn mime_type(&self) -> &Mime {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Caller headers in the order given; a name may repeat.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn fields(&self) -> &[(String, TypedValue)] {
        &self.fields
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequestBuilder {
    destination_url: String,
    file_path: PathBuf,
    file_field: Option<String>,
    mime_type: Option<String>,
    file_name: Option<String>,
    headers: Vec<(String, String)>,
    fields: Vec<(String, TypedValue)>,
}

impl UploadRequestBuilder {
    pub fn file_field(mut self, name: impl Into<String>) -> Self {
        self.file_field = Some(name.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Unset values default to the `file` field, a mime type guessed from the
    /// extension and the path's final component as the file name.
    ///
    /// Fails with [`UploadError::TypeConversion`] when the mime type does not parse.
    pub fn build(self) -> Result<UploadRequest, UploadError> {
        let mime_type = match self.mime_type {
            Some(mime_type) => parse_mime(&mime_type)?,
            None => mime_guess::from_path(&self.file_path).first_or_octet_stream(),
        };
        let file_name = self.file_name.unwrap_or_else(|| {
            self.file_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        Ok(UploadRequest {
            file_field: self
                .file_field
                .unwrap_or_else(|| DEFAULT_FILE_FIELD.to_string()),
            file_path: self.file_path,
            destination_url: self.destination_url,
            mime_type,
            file_name,
            headers: self.headers,
            fields: self.fields,
        })
    }
}

fn parse_mime(mime_type: &str) -> Result<Mime, UploadError> {
    mime_type.parse().map_err(|err| {
        UploadError::type_conversion("mimeType", format!("{mime_type:?} is not a media type: {err}"))
    })
}
