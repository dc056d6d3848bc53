//! SVG to PDF conversion with TRUE vector fidelity via svg2pdf.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{layout, CvRenderer, FileUrl, RenderError, RenderErrorKind};
use crate::cv::ExportCvData;

/// SVG to PDF converter using svg2pdf for true vector fidelity.
///
/// Text is converted to outlines by usvg, so the font database is loaded
/// once here and shared by every conversion.
pub struct SvgToPdfConverter {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl SvgToPdfConverter {
    /// Creates a converter backed by the fonts installed on this host.
    pub fn new() -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        debug!("Loaded {} font faces", fontdb.len());
        Self {
            fontdb: Arc::new(fontdb),
        }
    }

    /// Converts SVG content to PDF bytes.
    ///
    /// # Errors
    ///
    /// - SVG parsing errors (malformed XML, unsupported features)
    /// - Invalid dimensions (zero or negative width/height)
    pub fn convert(&self, svg_content: &str) -> Result<Vec<u8>> {
        let mut options = usvg::Options::default();
        options.fontdb = self.fontdb.clone();

        let tree = usvg::Tree::from_str(svg_content, &options)
            .context("Failed to parse SVG content")?;

        let size = tree.size();
        if size.width() <= 0.0 || size.height() <= 0.0 {
            anyhow::bail!(
                "Invalid SVG dimensions: {}x{}",
                size.width(),
                size.height()
            );
        }

        debug!(
            "SVG parsed successfully: {}x{} units",
            size.width(),
            size.height()
        );

        let pdf_data = svg2pdf::to_pdf(
            &tree,
            svg2pdf::ConversionOptions::default(),
            svg2pdf::PageOptions::default(),
        );

        Ok(pdf_data)
    }

    /// Converts SVG content and writes the PDF to `output_path`.
    pub fn convert_to_file(&self, svg_content: &str, output_path: &Path) -> Result<usize> {
        let pdf_data = self.convert(svg_content)?;
        write_pdf(&pdf_data, output_path)
    }
}

/// Writes `pdf_data` to a temporary sibling of `output_path` and renames it
/// into place, so readers never observe a partial document.
fn write_pdf(pdf_data: &[u8], output_path: &Path) -> Result<usize> {
    let dir = output_path
        .parent()
        .context("Output path has no parent directory")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(pdf_data)
        .context("Failed to write PDF data")?;
    tmp.persist(output_path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write PDF to {}", output_path.display()))?;

    Ok(pdf_data.len())
}

impl Default for SvgToPdfConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Concurrent conversions allowed unless [`PdfExportWorker::with_conversion_limit`] says otherwise.
pub const DEFAULT_CONVERSION_LIMIT: usize = 4;

/// Production [`CvRenderer`]: lays the CV out, converts it off the async
/// runtime and publishes the PDF under `public_base_url/files/`.
///
/// A conversion holds one of the worker's conversion slots until the blocking
/// task actually returns, even when the render already failed as timed out.
pub struct PdfExportWorker {
    converter: Arc<SvgToPdfConverter>,
    output_dir: PathBuf,
    public_base_url: String,
    timeout: Duration,
    conversions: Arc<Semaphore>,
    conversion_limit: u32,
}

impl PdfExportWorker {
    pub fn new(
        converter: Arc<SvgToPdfConverter>,
        output_dir: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            converter,
            output_dir: output_dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            timeout,
            conversions: Arc::new(Semaphore::new(DEFAULT_CONVERSION_LIMIT)),
            conversion_limit: DEFAULT_CONVERSION_LIMIT as u32,
        }
    }

    pub fn with_conversion_limit(mut self, limit: usize) -> Self {
        let limit = limit.clamp(1, u32::MAX as usize);
        self.conversions = Arc::new(Semaphore::new(limit));
        self.conversion_limit = limit as u32;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Waits until no conversion is running, including ones whose render
    /// already timed out.
    pub async fn wait_idle(&self) {
        if let Ok(all) = self.conversions.acquire_many(self.conversion_limit).await {
            drop(all);
        }
    }

    fn file_url(&self, file_name: &str) -> FileUrl {
        format!("{}/files/{}", self.public_base_url, file_name)
    }

    /// Runs `job` on the blocking pool under a conversion slot and the render
    /// timeout. The timeout starts once a slot is free. `job` receives a flag
    /// that is set when the render gave up waiting for it.
    async fn run_blocking<T, F>(&self, job: F) -> Result<T, RenderError>
    where
        T: Send + 'static,
        F: FnOnce(&AtomicBool) -> Result<T> + Send + 'static,
    {
        let permit = self
            .conversions
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::internal("renderer is shut down"))?;

        let abandoned = Arc::new(AtomicBool::new(false));
        let flag = abandoned.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&flag)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                abandoned.store(true, Ordering::Release);
                Err(RenderError::timeout(format!(
                    "renderer did not finish within {}s",
                    self.timeout.as_secs_f32()
                )))
            }
            Ok(Err(join_error)) => Err(RenderError::internal(format!(
                "renderer crashed: {join_error}"
            ))),
            Ok(Ok(Err(e))) => Err(RenderError::internal(format!("{e:#}"))),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

#[async_trait]
impl CvRenderer for PdfExportWorker {
    async fn render(&self, input: &ExportCvData) -> Result<FileUrl, RenderError> {
        input
            .validate()
            .map_err(|e| RenderError::input(e.to_string()))?;

        let svg = layout::render_svg(input);
        let file_name = format!(
            "cv-{}-{}.pdf",
            slug(&input.personal.full_name),
            Uuid::new_v4().simple()
        );
        let output_path = self.output_dir.join(&file_name);

        info!("Converting CV to PDF (VECTOR): output={}", output_path.display());
        let started = Instant::now();

        let converter = self.converter.clone();
        let result = self
            .run_blocking(move |abandoned| {
                let pdf_data = converter.convert(&svg)?;
                // nobody will link the file once the render has timed out
                if abandoned.load(Ordering::Acquire) {
                    return Ok(None);
                }
                write_pdf(&pdf_data, &output_path).map(Some)
            })
            .await;

        match result {
            Ok(Some(bytes)) => {
                info!(
                    file = %file_name,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "PDF export complete (VECTOR)"
                );
                Ok(self.file_url(&file_name))
            }
            Ok(None) => Err(RenderError::internal("conversion finished after it was abandoned")),
            Err(e) => {
                if e.kind == RenderErrorKind::Timeout {
                    // the blocking conversion cannot be interrupted; it keeps its slot until done
                    warn!(file = %file_name, timeout_ms = self.timeout.as_millis() as u64, "PDF render timed out");
                }
                Err(e)
            }
        }
    }
}

/// Lowercase ASCII slug for file names, `cv` when nothing usable remains.
fn slug(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let out = out.trim_end_matches('-');
    if out.is_empty() {
        "cv".to_string()
    } else {
        out.chars().take(40).collect()
    }
}
