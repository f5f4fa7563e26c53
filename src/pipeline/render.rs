//! Page image source: rasterise every page of a document for the VLM.
//!
//! [`PageImageSource`] is the seam between the orchestrators and pdfium.
//! [`PdfiumPageSource`] is the production implementation; tests swap in an
//! in-memory source that hands out fixed images.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not run on Tokio worker threads. Rendering happens on the
//! blocking pool; per-page progress flows back over a channel so the async
//! side can forward it to the caller while rendering is still under way.
//!
//! ## Why cap pixels as well as DPI?
//!
//! A receipt scanned at poster size would produce a huge bitmap at 150 DPI.
//! `max_rendered_pixels` bounds the longest edge regardless of physical size.

use crate::config::ExtractionConfig;
use crate::error::BillReconError;
use crate::pipeline::encode::{encode_page, PageImage};
use crate::pipeline::input::Document;
use pdfium_render::prelude::*;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Produces the ordered page images of a document.
pub trait PageImageSource: Send + Sync {
    /// Rasterise every page, in document order.
    ///
    /// `on_progress` receives the completed fraction (`0.0..=1.0`) after each
    /// page. A document with no pages is an error.
    fn rasterize(
        &self,
        document: &Document,
        on_progress: &(dyn Fn(f32) + Send + Sync),
    ) -> impl Future<Output = Result<Vec<PageImage>, BillReconError>> + Send;
}

/// Renders pages with pdfium.
#[derive(Clone)]
pub struct PdfiumPageSource {
    dpi: u32,
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl std::fmt::Debug for PdfiumPageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumPageSource")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PdfiumPageSource {
    pub fn new(dpi: u32, max_rendered_pixels: u32) -> Self {
        Self {
            dpi,
            max_rendered_pixels,
            password: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.dpi, config.max_rendered_pixels).with_password(config.password.clone())
    }
}

impl PageImageSource for PdfiumPageSource {
    async fn rasterize(
        &self,
        document: &Document,
        on_progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<Vec<PageImage>, BillReconError> {
        let path = document.path().to_path_buf();
        let dpi = self.dpi;
        let max_pixels = self.max_rendered_pixels;
        let password = self.password.clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<f32>();

        let handle = tokio::task::spawn_blocking(move || {
            render_document_blocking(&path, dpi, max_pixels, password.as_deref(), &tx)
        });

        // The sender lives in the blocking task, so this drains until rendering ends.
        while let Some(fraction) = rx.recv().await {
            on_progress(fraction);
        }

        let pages = handle
            .await
            .map_err(|e| BillReconError::Internal(format!("Render task panicked: {}", e)))??;

        if pages.is_empty() {
            return Err(BillReconError::EmptyDocument {
                path: document.path().to_path_buf(),
            });
        }
        Ok(pages)
    }
}

/// Blocking implementation of page rendering.
fn render_document_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    progress: &mpsc::UnboundedSender<f32>,
) -> Result<Vec<PageImage>, BillReconError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| classify_load_error(pdf_path.to_path_buf(), password.is_some(), e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| BillReconError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width(page.width().value, dpi, max_pixels))
            .set_maximum_height(max_pixels as i32);

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            BillReconError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        let encoded =
            encode_page(page_num, &image).map_err(|e| BillReconError::RasterisationFailed {
                page: page_num,
                detail: e.to_string(),
            })?;
        results.push(encoded);

        // Receiver gone means the caller stopped listening; keep rendering.
        let _ = progress.send(page_num as f32 / total_pages as f32);
    }

    Ok(results)
}

/// Load pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system.
fn bind_pdfium() -> Result<Pdfium, BillReconError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| BillReconError::PdfiumUnavailable {
        detail: format!("{:?}", e),
    })?;
    Ok(Pdfium::new(bindings))
}

/// Page width in pixels at `dpi`, capped at `max_pixels`.
fn target_width(width_points: f32, dpi: u32, max_pixels: u32) -> i32 {
    let px = (width_points / 72.0 * dpi as f32).round();
    if !px.is_finite() || px < 1.0 {
        return max_pixels as i32;
    }
    (px as u32).min(max_pixels) as i32
}

fn classify_load_error(path: PathBuf, had_password: bool, e: PdfiumError) -> BillReconError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            BillReconError::WrongPassword { path }
        } else {
            BillReconError::PasswordRequired { path }
        }
    } else {
        BillReconError::CorruptDocument {
            path,
            detail: err_str,
        }
    }
}
