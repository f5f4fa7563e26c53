//! Progress reporting for extraction attempts.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events while a document is rasterised and sent for extraction.
//!
//! Overall progress is a single percentage that never decreases:
//!
//! ```text
//!  0 ──────────── 75 ── 80 ─────────── 100
//!  rasterise pages      request issued  reply parsed
//!  (page i of n → 75·i/n)
//! ```
//!
//! The anomaly check reports no incremental progress.
//!
//! # Example
//!
//! ```rust
//! use edgequake_billrecon::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_progress(&self, percent: f32) {
//!         eprintln!("{percent:.0}%");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Share of overall progress spent rasterising pages.
pub const RASTER_SHARE: f32 = 75.0;
/// Progress once the remote extraction request has been issued.
pub const REQUEST_ISSUED: f32 = 80.0;
/// Progress once the reply has been parsed.
pub const COMPLETE: f32 = 100.0;

/// Called by the extraction orchestrator as an attempt advances.
///
/// All methods default to no-ops so callers only override what they need.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before rasterisation starts.
    fn on_extraction_start(&self, document: &str) {
        let _ = document;
    }

    /// Called once all pages are rendered.
    fn on_pages_rendered(&self, page_count: usize) {
        let _ = page_count;
    }

    /// Overall progress in `0.0..=100.0`; never decreases within an attempt.
    fn on_progress(&self, percent: f32) {
        let _ = percent;
    }

    /// Called when an attempt settles with at least one bill.
    fn on_extraction_complete(&self, bill_count: usize) {
        let _ = bill_count;
    }

    /// Called when an attempt settles without bills or with an error.
    fn on_extraction_failed(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// Forwards progress to an optional callback, clamped and monotonic.
pub(crate) struct ProgressReporter {
    callback: Option<ProgressCallback>,
    // f32 bits of a value in `0.0..=100.0` with the sign bit clear, so bit
    // order matches numeric order.
    last: AtomicU32,
}

impl ProgressReporter {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    pub(crate) fn callback(&self) -> Option<&ProgressCallback> {
        self.callback.as_ref()
    }

    /// Report `percent`, ignoring values below what was already reported.
    pub(crate) fn report(&self, percent: f32) {
        // `> 0.0` also maps -0.0 to +0.0.
        let percent = if percent.is_finite() && percent > 0.0 {
            percent.min(COMPLETE)
        } else {
            0.0
        };
        let bits = percent.to_bits();
        let previous = self.last.fetch_max(bits, Ordering::SeqCst);
        if bits > previous {
            if let Some(cb) = &self.callback {
                cb.on_progress(percent);
            }
        }
    }

    /// Map a rasteriser's fractional completion onto the first 75 %.
    pub(crate) fn report_raster_fraction(&self, fraction: f32) {
        self.report(RASTER_SHARE * fraction.clamp(0.0, 1.0));
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> f32 {
        f32::from_bits(self.last.load(Ordering::SeqCst))
    }
}
