use std::{error::Error as StdError, fmt::Write, path::PathBuf};

use reqwest::{StatusCode, header::HeaderMap};
use thiserror::Error;
use url::Url;

/// Terminal failure of an upload call.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("upload rejected with HTTP status {}", .0.status)]
    HttpFailure(Box<FailedResponse>),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("cannot convert `{key}`: {reason}")]
    TypeConversion { key: String, reason: String },
}

impl UploadError {
    /// Stable tag for hosts that forward errors across a boundary as plain data.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::FileNotFound(_) => "FILE_NOT_FOUND",
            UploadError::HttpFailure(_) => "HTTP_FAILURE",
            UploadError::Transport(_) => "TRANSPORT_ERROR",
            UploadError::TypeConversion { .. } => "TYPE_CONVERSION",
        }
    }

    pub(crate) fn type_conversion(key: impl Into<String>, reason: impl Into<String>) -> Self {
        UploadError::TypeConversion {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport(describe(&err))
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Transport(describe(&err))
    }
}

/// The server's answer to an upload it did not accept.
#[derive(Debug, Clone)]
pub struct FailedResponse {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

// reqwest hides the interesting part ("connection refused", "invalid header") in the source chain.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(text, ": {}", cause);
        source = cause.source();
    }
    text
}
