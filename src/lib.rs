//! Streaming `multipart/form-data` file uploads with throttled progress reporting.
//!
//! ```no_run
//! # async fn run() -> Result<(), file_transfer::UploadError> {
//! use file_transfer::{ProgressEvent, UploadClient, UploadRequest};
//!
//! let request = UploadRequest::builder("https://example.com/upload", "/tmp/cat.png")
//!     .header("Authorization", "Bearer token")
//!     .field("caption", "hello")
//!     .build()?;
//!
//! let body = UploadClient::new()
//!     .upload(request, |event: ProgressEvent| println!("{:.0}%", event.progress * 100.0))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod field;
pub mod multipart;
pub mod options;
pub mod progress;
pub mod request;
mod serde_utils;

pub use client::UploadClient;
pub use config::{Config, read_config};
pub use error::{FailedResponse, UploadError};
pub use field::{TypedValue, encode};
pub use multipart::{FileSource, MultipartBody, MultipartPart, PartContent};
pub use options::{FileUriResolver, UploadOptions, UriResolver};
pub use progress::{
    NoProgress, PROGRESS_EVENT_NAME, ProgressCountingStream, ProgressEvent, ProgressSink,
    ProgressThrottle,
};
pub use request::{UploadRequest, UploadRequestBuilder};
