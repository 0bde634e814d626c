use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use file_transfer::{
    FailedResponse, FileUriResolver, ProgressEvent, TypedValue, UploadClient, UploadError,
    UploadOptions, UploadRequest, config,
};
use iocraft::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::ui::{ErrorMessage, ProgressBar, ResponseBody, SuccessMessage};

mod ui;

#[derive(Parser)]
#[command(name = "file-transfer")]
#[command(version)]
#[command(about = "Upload files as multipart/form-data with progress reporting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct UploadArgs {
    /// File to upload
    #[arg(value_hint = ValueHint::FilePath)]
    file: PathBuf,
    /// Destination URL
    #[arg(short, long, value_hint = ValueHint::Url)]
    url: Url,
    /// Form field name of the file part
    #[arg(short = 'k', long, default_value = file_transfer::request::DEFAULT_FILE_FIELD)]
    field_name: String,
    /// Content type of the file part, guessed from the extension when omitted
    #[arg(short, long)]
    mime_type: Option<String>,
    /// File name sent to the server, defaults to the local file name
    #[arg(short = 'n', long)]
    file_name: Option<String>,
    /// Extra request header as `Name: value`, may repeat
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
    /// Form field as `key=value`; JSON values (numbers, booleans, null, arrays, objects) keep their type
    #[arg(short = 'F', long = "field", value_parser = parse_field)]
    fields: Vec<(String, TypedValue)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file
    Upload(UploadArgs),
    /// Upload using a JSON options object (fileKey, uri, uploadUrl, mimeType, fileName, headers, data)
    Send {
        #[arg(value_hint = ValueHint::FilePath)]
        options: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let _rt_guard = rt.enter();
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    rt.block_on(async {
        let config = config::read_config()?;
        match cli.command {
            Commands::Config => {
                println!("{}", config);
                println!("config file: {}", config::config_file_path()?.display());
                Ok(())
            }
            requires_client => {
                let client = UploadClient::from_config(&config)?;
                let request = match requires_client {
                    Commands::Upload(args) => request_from_args(args)?,
                    Commands::Send { options } => request_from_options(&options)?,
                    Commands::Config => unreachable!("handled above"),
                };
                upload_file(&client, request).await
            }
        }
    })
}

fn request_from_args(args: UploadArgs) -> Result<UploadRequest> {
    let mut builder =
        UploadRequest::builder(args.url.to_string(), args.file).file_field(args.field_name);
    if let Some(mime_type) = args.mime_type {
        builder = builder.mime_type(mime_type);
    }
    if let Some(file_name) = args.file_name {
        builder = builder.file_name(file_name);
    }
    for (name, value) in args.headers {
        builder = builder.header(name, value);
    }
    for (name, value) in args.fields {
        builder = builder.field(name, value);
    }
    Ok(builder.build()?)
}

fn request_from_options(path: &Path) -> Result<UploadRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read options from {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| anyhow!("Failed to parse options: {e} from file {}", path.display()))?;
    let options = UploadOptions::from_value(value)?;
    Ok(options.into_request(&FileUriResolver)?)
}

async fn upload_file(client: &UploadClient, request: UploadRequest) -> Result<()> {
    let title = format!("Uploading {}", request.file_name());
    let (tx, rx) = watch::channel(0.0);

    let upload = client.upload(request, move |event: ProgressEvent| {
        let _ = tx.send((event.progress * 100.0) as f32);
    });

    let mut progress_bar = element!(ProgressBar(title: title, progress: Some(rx)));

    let result = tokio::select! {
        result = upload => result,
        _ = progress_bar.render_loop() => {
            unreachable!("render_loop should not terminate")
        }
    };

    match result {
        Ok(body) => {
            element!(SuccessMessage(message: "Upload complete".to_string())).print();
            if !body.is_empty() {
                element!(ResponseBody(body: body)).print();
            }
            Ok(())
        }
        Err(UploadError::HttpFailure(response)) => {
            let FailedResponse {
                status, url, body, ..
            } = *response;
            element!(ErrorMessage(message: format!("Server rejected the upload ({url})"))).print();
            element!(ResponseBody(status: Some(status.to_string()), body: body)).print();
            bail!("upload failed with HTTP status {status}")
        }
        Err(err) => {
            element!(ErrorMessage(message: err.to_string())).print();
            Err(err.into())
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("expected `Name: value`, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header name is empty in `{raw}`");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_field(raw: &str) -> Result<(String, TypedValue)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected `key=value`, got `{raw}`"))?;
    if key.is_empty() {
        bail!("field name is empty in `{raw}`");
    }
    let value = match serde_json::from_str(value) {
        Ok(json) => TypedValue::from_json(key, json)?,
        Err(_) => TypedValue::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}
