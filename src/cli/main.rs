//! Background Removal CLI Tool
//!
//! Command-line interface driving the processing orchestrator against a
//! single input image.

use crate::{
    credentials::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore},
    orchestrator::ProcessingOrchestrator,
    prediction::PredictionClient,
    presenter::LogResultPresenter,
    types::{ImageRef, Method, ProcessingOutput, ProcessingRequest},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Background removal CLI tool
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "nobg")]
pub struct Cli {
    /// Input image file
    #[arg(value_name = "INPUT", required_unless_present = "clear_token")]
    pub input: Option<PathBuf>,

    /// Output file [default: <INPUT stem>-nobg.png beside the input]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Processing backend
    #[arg(short, long, value_enum, default_value_t = CliMethod::Remote)]
    pub method: CliMethod,

    /// API token for the remote service (stored for later runs)
    #[arg(long, value_name = "TOKEN")]
    pub api_token: Option<String>,

    /// Remove the stored API token and exit
    #[arg(long)]
    pub clear_token: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliMethod {
    Local,
    Remote,
}

impl From<CliMethod> for Method {
    fn from(method: CliMethod) -> Self {
        match method {
            CliMethod::Local => Self::Local,
            CliMethod::Remote => Self::Remote,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    crate::tracing_config::init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let file_store = FileCredentialStore::new().context("Failed to locate config directory")?;

    // Handle special flags that don't require an input
    if cli.clear_token {
        file_store.clear();
        println!("🗑️  Stored API token removed");
        return Ok(());
    }

    let Some(input) = cli.input.clone() else {
        anyhow::bail!("An input image is required");
    };
    let method = Method::from(cli.method);

    info!("Starting background removal CLI");
    info!("Input: {}", input.display());
    info!("Method: {method}");

    let store = resolve_credential_store(&cli, file_store);

    let image_bytes = std::fs::read(&input)
        .with_context(|| format!("Failed to read input image: {}", input.display()))?;

    // The client is shared with the orchestrator so output downloads
    // reuse the same connection pool
    let client = PredictionClient::new().context("Failed to create prediction client")?;
    let orchestrator = ProcessingOrchestrator::builder()
        .prediction_client(client.clone())
        .credential_store(store)
        .result_presenter(Box::new(LogResultPresenter::new(cli.verbose > 0)))
        .build()
        .context("Failed to create processing orchestrator")?;

    let spinner = create_spinner(&format!("Removing background ({method})..."));
    let result = orchestrator
        .process(&ProcessingRequest::new(image_bytes, method))
        .await;
    spinner.finish_and_clear();

    let output = result.map_err(|err| {
        let message = err.user_message().unwrap_or_else(|| err.to_string());
        anyhow::anyhow!(message)
    })?;

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input));
    save_output(&client, &output, &output_path).await?;

    println!("✅ Saved: {}", output_path.display());
    Ok(())
}

/// Resolve which credential store backs this run
///
/// Order: `--api-token` flag (persisted for next time), then the
/// `REPLICATE_API_TOKEN` environment variable (this run only), then
/// whatever the file store already holds.
fn resolve_credential_store(cli: &Cli, file_store: FileCredentialStore) -> Box<dyn CredentialStore> {
    if let Some(token) = &cli.api_token {
        info!("Using API token from command line (stored for later runs)");
        file_store.set(Credential::new(token.clone()));
        return Box::new(file_store);
    }

    if let Ok(token) = std::env::var("REPLICATE_API_TOKEN") {
        let token = token.trim();
        if !token.is_empty() {
            info!("Using API token from REPLICATE_API_TOKEN");
            let store = MemoryCredentialStore::new();
            store.set(Credential::new(token));
            return Box::new(store);
        }
    }

    Box::new(file_store)
}

fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Materialize the processed image on disk
///
/// Remote results arrive as a URL and are downloaded first; local
/// results are already bytes.
async fn save_output(
    client: &PredictionClient,
    output: &ProcessingOutput,
    path: &Path,
) -> Result<()> {
    let bytes = match &output.image {
        ImageRef::Bytes(bytes) => bytes.clone(),
        ImageRef::Url(url) => {
            info!("Fetching processed image from: {url}");
            client
                .download_output(url)
                .await
                .context("Failed to download processed image")?
        },
    };

    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write output image: {}", path.display()))?;
    Ok(())
}

fn default_output_path(input_path: &Path) -> PathBuf {
    let stem = input_path.file_stem().unwrap_or_default();
    let dir = input_path.parent().unwrap_or(Path::new("."));
    dir.join(format!("{}-nobg.png", stem.to_string_lossy()))
}
