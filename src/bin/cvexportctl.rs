//! cvexportctl - command-line client for the CV export service

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cv_export::client::{
    DriverConfig, DriverOutcome, DriverState, ExportApi, ExportDriver, HttpExportApi,
};
use cv_export::cv::ExportCvData;
use cv_export::cv_sync::{CvSync, HttpParsingService};
use cv_export::job::JobId;
use cv_export::telemetry;
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Parser)]
#[command(name = "cvexportctl", version, about = "Export CVs to PDF and sync CV files")]
struct Cli {
    /// Base URL of the export service
    #[arg(long, env = "CV_EXPORT_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// Log to stderr (level from RUST_LOG, default info)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a CV (JSON file) to PDF and print the download URL
    Export {
        /// CV data in the export JSON format
        cv: PathBuf,
    },
    /// Show the status of an export job
    Status {
        job_id: String,
    },
    /// Upload a CV file to the parsing service and print the parsed CV
    Sync {
        /// A .pdf, .doc, .docx or .txt file
        file: PathBuf,

        /// Base URL of the parsing service
        #[arg(long, env = "CV_PARSER_URL")]
        parser_url: String,

        /// Bearer token for the parsing service
        #[arg(long, env = "CV_PARSER_TOKEN", hide_env_values = true)]
        parser_token: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        telemetry::init_tracing();
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling...");
            on_interrupt.cancel();
        }
    });

    if let Err(e) = execute_command(&cli, &cancel).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli, cancel: &CancellationToken) -> Result<()> {
    match &cli.command {
        Command::Export { cv } => export(&cli.api_url, cv, cancel).await,
        Command::Status { job_id } => status(&cli.api_url, job_id).await,
        Command::Sync {
            file,
            parser_url,
            parser_token,
        } => sync(file, parser_url, parser_token.clone(), cancel).await,
    }
}

async fn export(api_url: &str, path: &PathBuf, cancel: &CancellationToken) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cv: ExportCvData =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid CV JSON", path.display()))?;

    let api = HttpExportApi::new(api_url)?;
    let driver = ExportDriver::new(api, DriverConfig::default());

    let mut states = driver.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let line = match &*states.borrow_and_update() {
                DriverState::Submitting { attempt } => format!("submitting (attempt {attempt})"),
                DriverState::Polling { job_id, attempt } => {
                    format!("waiting for job {job_id} (check {attempt})")
                }
                _ => continue,
            };
            eprintln!("{line}");
        }
    });

    let outcome = driver.run(&cv, cancel).await;
    drop(driver);
    let _ = progress.await;

    match outcome {
        DriverOutcome::Succeeded(url) => {
            println!("{url}");
            Ok(())
        }
        DriverOutcome::Failed(e) if e.is_retryable() => {
            bail!("export failed ({}), try again: {}", e.kind, e.message)
        }
        DriverOutcome::Failed(e) => bail!("export failed ({}): {}", e.kind, e.message),
        DriverOutcome::Cancelled => bail!("export cancelled"),
    }
}

async fn status(api_url: &str, job_id: &str) -> Result<()> {
    let api = HttpExportApi::new(api_url)?;
    let status = api.job_status(&JobId::from(job_id)).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn sync(
    file: &PathBuf,
    parser_url: &str,
    token: Option<String>,
    cancel: &CancellationToken,
) -> Result<()> {
    let sync = CvSync::new(HttpParsingService::new(parser_url, token));
    let parsed = sync.sync_file(file, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}
