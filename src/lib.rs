//! CV PDF export service library
//!
//! Accepts CV data over HTTP, renders it to PDF in the background and reports
//! progress through short-lived job records. The client side submits an
//! export and polls it to completion, and syncs uploaded CV files through an
//! external parsing service.
//!
//! ## Module Overview
//!
//! - `api`: axum routes (`POST /export-pdf`, `GET /export-pdf/job/{jobId}`)
//! - `client`: HTTP client and the export driver (submit, backoff, poll)
//! - `config`: environment-based server configuration
//! - `cv`: export input model and validation
//! - `cv_sync`: CV upload to the parsing service
//! - `dispatch`: bounded background execution of export jobs
//! - `error`: error classification shared by server and client
//! - `job`: job records and their state machine
//! - `poll`: poll-until-terminal loop
//! - `renderer`: CV layout and SVG to PDF conversion
//! - `store`: job stores with TTL expiry (in-memory, Redis)
//! - `telemetry`: tracing subscriber and OpenTelemetry export
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cv_export::client::{DriverConfig, DriverOutcome, ExportDriver, HttpExportApi};
//! use cv_export::cv::ExportCvData;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cv: ExportCvData = serde_json::from_str(&std::fs::read_to_string("cv.json")?)?;
//!     let api = HttpExportApi::new("http://localhost:8080")?;
//!     let driver = ExportDriver::new(api, DriverConfig::default());
//!
//!     match driver.run(&cv, &CancellationToken::new()).await {
//!         DriverOutcome::Succeeded(url) => println!("{url}"),
//!         DriverOutcome::Failed(e) => eprintln!("{e}"),
//!         DriverOutcome::Cancelled => {}
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod cv;
pub mod cv_sync;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod poll;
pub mod renderer;
pub mod store;
pub mod telemetry;
