use std::io;

use http_body_util::BodyDataStream;
use reqwest::{
    Body, Client,
    header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{FailedResponse, UploadError};
use crate::multipart::{FileSource, MultipartBody};
use crate::progress::{ProgressCountingStream, ProgressGate, ProgressSink};
use crate::request::UploadRequest;

/// Uploads files as `multipart/form-data`.
///
/// Cloning is cheap and clones share the connection pool. Nothing else is
/// shared between calls: each upload gets its own boundary and counters.
#[derive(Clone, Debug, Default)]
pub struct UploadClient {
    client: Client,
}

impl UploadClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Result<Self, UploadError> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Uploads `request` and returns the response body text.
    ///
    /// Progress events for this call are all delivered before this returns.
    pub async fn upload<P>(&self, request: UploadRequest, on_progress: P) -> Result<String, UploadError>
    where
        P: ProgressSink + 'static,
    {
        let gate = ProgressGate::new(on_progress);
        let result = self.send(&request, gate.clone()).await;
        gate.close();

        match &result {
            Ok(body) => info!(
                url = request.destination_url(),
                response_bytes = body.len(),
                "upload finished"
            ),
            Err(err) => warn!(
                url = request.destination_url(),
                code = err.code(),
                error = %err,
                "upload failed"
            ),
        }
        result
    }

    /// Runs the upload on its own task and hands the result to `on_complete` exactly once.
    pub fn spawn<P, C>(&self, request: UploadRequest, on_progress: P, on_complete: C) -> JoinHandle<()>
    where
        P: ProgressSink + 'static,
        C: FnOnce(Result<String, UploadError>) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let result = client.upload(request, on_progress).await;
            on_complete(result);
        })
    }

    async fn send<P>(&self, request: &UploadRequest, on_progress: P) -> Result<String, UploadError>
    where
        P: ProgressSink + 'static,
    {
        let file_len = local_file_len(request).await?;

        let mut headers = build_headers(request.headers())?;
        // The form sets both from the body it produces.
        headers.remove(CONTENT_TYPE);
        headers.remove(CONTENT_LENGTH);

        let form = MultipartBody::build(
            request.file_field(),
            FileSource::new(request.file_path(), file_len),
            request.file_name(),
            request.mime_type(),
            request.fields(),
        )
        .into_form()
        .await?;

        let mut http_request = self
            .client
            .post(request.destination_url())
            .headers(headers)
            .multipart(form)
            .build()?;

        let content_length = declared_length(http_request.headers());
        info!(
            url = request.destination_url(),
            file = %request.file_path().display(),
            content_length,
            "starting upload"
        );

        let body = http_request
            .body_mut()
            .take()
            .ok_or_else(|| UploadError::Transport("multipart request has no body".to_string()))?;
        let counted =
            ProgressCountingStream::new(BodyDataStream::new(body), content_length, on_progress);
        *http_request.body_mut() = Some(Body::wrap_stream(counted));

        let response = self.client.execute(http_request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let url = response.url().clone();
            let headers = response.headers().clone();
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(
                        %status,
                        %url,
                        error = %err,
                        "could not read the rejected upload's response body"
                    );
                    String::new()
                }
            };
            return Err(UploadError::HttpFailure(Box::new(FailedResponse {
                status,
                url,
                headers,
                body,
            })));
        }

        Ok(response.text().await?)
    }
}

async fn local_file_len(request: &UploadRequest) -> Result<Option<u64>, UploadError> {
    let not_found = || UploadError::FileNotFound(request.file_path().to_path_buf());

    match tokio::fs::metadata(request.file_path()).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
        Ok(_) => Err(not_found()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_found()),
        Err(err) => Err(err.into()),
    }
}

/// Repeated names are appended, not replaced.
fn build_headers(pairs: &[(String, String)]) -> Result<HeaderMap, UploadError> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| UploadError::Transport(format!("invalid header name `{name}`: {err}")))?;
        headers.append(name, header_value(value)?);
    }
    Ok(headers)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

fn header_value(value: &str) -> Result<HeaderValue, UploadError> {
    HeaderValue::from_str(value)
        .map_err(|err| UploadError::Transport(format!("invalid header value `{value}`: {err}")))
}
