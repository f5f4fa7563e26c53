//! Extraction orchestrator: rasterise → extract → parse, as one attempt.
//!
//! An attempt:
//!
//! 1. Rejects with [`BillReconError::Busy`] if another attempt is in flight.
//! 2. Resets the session, so nothing from an earlier document survives.
//! 3. Rasterises every page; page `i` of `n` reports `75·i/n` percent.
//! 4. Issues one remote extraction call (80 %), parses the reply (100 %).
//! 5. Settles as [`ExtractionOutcome::Populated`], [`ExtractionOutcome::Empty`],
//!    or [`ExtractionOutcome::Failed`].
//!
//! There is no retry and no cancellation; the user starts a new attempt.

use crate::config::ExtractionConfig;
use crate::error::{BillReconError, Operation};
use crate::normalize::parse_response;
use crate::pipeline::input::Document;
use crate::pipeline::remote::{LlmRemote, RemoteModel};
use crate::pipeline::render::{PageImageSource, PdfiumPageSource};
use crate::progress::{ProgressCallback, ProgressReporter, COMPLETE, REQUEST_ISSUED};
use crate::records::{BillId, BillLineItem, ExtractionResult, PatientRecord, PolicyHolderRecord};
use crate::schema::{build_request, build_request_with};
use crate::session::Session;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// User-facing text for a failed attempt.
pub const PROCESSING_ERROR_MESSAGE: &str = "document processing error";
/// User-facing text for an attempt that found no bills.
pub const EMPTY_EXTRACTION_MESSAGE: &str = "no bills found, try another document";

/// How an extraction attempt settled.
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// At least one bill; the session has been seeded with these values.
    Populated(PopulatedExtraction),
    /// The reply parsed (or was recovered) but held no bills.
    Empty,
    /// Rasterisation or the remote call failed. The session stays cleared.
    Failed(ExtractionFailure),
}

impl ExtractionOutcome {
    /// Message to show the user, if the attempt did not populate.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::Populated(_) => None,
            Self::Empty => Some(EMPTY_EXTRACTION_MESSAGE),
            Self::Failed(f) => Some(f.message),
        }
    }

    pub fn is_populated(&self) -> bool {
        matches!(self, Self::Populated(_))
    }
}

/// Extraction result after ids have been assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulatedExtraction {
    pub bills: Vec<BillLineItem>,
    pub patient: PatientRecord,
    pub policy_holder: PolicyHolderRecord,
}

impl PopulatedExtraction {
    /// Assign a fresh id to every bill, in order.
    fn from_result(result: ExtractionResult) -> Self {
        Self {
            bills: result
                .bills
                .into_iter()
                .map(|draft| BillLineItem::from_draft(BillId::new(), draft))
                .collect(),
            patient: result.patient,
            policy_holder: result.policy_holder,
        }
    }
}

/// A failed attempt: fixed user message plus the underlying cause for logs.
#[derive(Debug)]
pub struct ExtractionFailure {
    pub message: &'static str,
    pub cause: BillReconError,
}

impl ExtractionFailure {
    /// Whether retrying the same document might succeed.
    pub fn is_transient(&self) -> bool {
        self.cause.is_transient()
    }
}

/// Holds an in-flight flag for as long as it lives.
pub(crate) struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool, operation: Operation) -> Result<Self, BillReconError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!("Rejected {}: one is already in flight", operation);
                BillReconError::Busy { operation }
            })?;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives extraction attempts against a session.
pub struct ExtractionOrchestrator<S, R> {
    source: S,
    remote: R,
    instruction: Option<String>,
    progress_callback: Option<ProgressCallback>,
    busy: AtomicBool,
}

impl ExtractionOrchestrator<PdfiumPageSource, LlmRemote> {
    /// pdfium rasteriser plus the provider resolved from `config`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, BillReconError> {
        Ok(Self::new(
            PdfiumPageSource::from_config(config),
            LlmRemote::from_config(config)?,
        )
        .with_instruction(config.extraction_prompt.clone())
        .with_progress_callback(config.progress_callback.clone()))
    }
}

impl<S: PageImageSource, R: RemoteModel> ExtractionOrchestrator<S, R> {
    pub fn new(source: S, remote: R) -> Self {
        Self {
            source,
            remote,
            instruction: None,
            progress_callback: None,
            busy: AtomicBool::new(false),
        }
    }

    /// Override the built-in extraction instruction.
    pub fn with_instruction(mut self, instruction: Option<String>) -> Self {
        self.instruction = instruction;
        self
    }

    pub fn with_progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress_callback = callback;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Whether an attempt is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run one extraction attempt for `document` into `session`.
    ///
    /// The only `Err` is [`BillReconError::Busy`], in which case `session`
    /// is untouched. Every other failure settles as
    /// [`ExtractionOutcome::Failed`].
    pub async fn run(
        &self,
        session: &mut Session,
        document: &Document,
    ) -> Result<ExtractionOutcome, BillReconError> {
        let _guard = BusyGuard::acquire(&self.busy, Operation::Extraction)?;
        let start = Instant::now();

        session.reset(document);
        info!("Starting extraction: {} ({})", document.name(), document.id());

        let reporter = ProgressReporter::new(self.progress_callback.clone());
        if let Some(cb) = reporter.callback() {
            cb.on_extraction_start(document.name());
        }

        let outcome = match self.attempt(document, &reporter).await {
            Ok(result) if result.bills.is_empty() => {
                warn!("Extraction found no bills in {}", document.name());
                ExtractionOutcome::Empty
            }
            Ok(result) => {
                let populated = PopulatedExtraction::from_result(result);
                session.seed(
                    populated.bills.clone(),
                    populated.patient.clone(),
                    populated.policy_holder.clone(),
                );
                info!(
                    "Extracted {} bills from {} in {:?}",
                    populated.bills.len(),
                    document.name(),
                    start.elapsed()
                );
                ExtractionOutcome::Populated(populated)
            }
            Err(cause) => {
                warn!("Extraction failed for {}: {}", document.name(), cause);
                ExtractionOutcome::Failed(ExtractionFailure {
                    message: PROCESSING_ERROR_MESSAGE,
                    cause,
                })
            }
        };

        if let Some(cb) = reporter.callback() {
            match &outcome {
                ExtractionOutcome::Populated(p) => cb.on_extraction_complete(p.bills.len()),
                other => cb.on_extraction_failed(other.user_message().unwrap_or_default()),
            }
        }

        Ok(outcome)
    }

    async fn attempt(
        &self,
        document: &Document,
        reporter: &ProgressReporter,
    ) -> Result<ExtractionResult, BillReconError> {
        // ── Step 1: Rasterise ────────────────────────────────────────────────
        let on_page = |fraction: f32| reporter.report_raster_fraction(fraction);
        let images = self.source.rasterize(document, &on_page).await?;
        info!("Rendered {} pages", images.len());
        if let Some(cb) = reporter.callback() {
            cb.on_pages_rendered(images.len());
        }

        // ── Step 2: Remote extraction ────────────────────────────────────────
        let request = match self.instruction.as_deref() {
            Some(instruction) => build_request_with(instruction, images),
            None => build_request(images),
        };
        reporter.report(REQUEST_ISSUED);
        let raw = self.remote.extract(&request).await?;

        // ── Step 3: Parse ────────────────────────────────────────────────────
        let result = parse_response(raw.as_deref());
        reporter.report(COMPLETE);
        Ok(result)
    }
}
