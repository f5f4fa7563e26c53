//! # edgequake-billrecon
//!
//! Extract and reconcile medical bills from scanned claim documents using
//! Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Claim bundles arrive as scanned PDFs: hospital invoices, pharmacy
//! receipts, lab bills, plus the patient's and policy holder's details
//! scattered across pages. This crate rasterises every page, asks a VLM for
//! one structured JSON payload, and normalises it into a typed ledger the
//! user can correct before a summary report is compiled.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      local file, URL download, or uploaded bytes
//!  ├─ 2. Render     rasterise pages via pdfium (spawn_blocking)   0–75 %
//!  ├─ 3. Extract    one VLM call with the output schema            80 %
//!  ├─ 4. Normalise  strip fences, validate, merge onto blanks     100 %
//!  ├─ 5. Reconcile  add / update / delete bills in the ledger
//!  └─ 6. Report     tabular layout → paginated Markdown
//! ```
//!
//! An independent anomaly check sends the same pages with an advisory
//! instruction and returns free-form notes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_billrecon::{
//!     compile, Document, ExtractionConfig, ExtractionOrchestrator, ExtractionOutcome,
//!     MarkdownReportRenderer, ReportConfig, ReportRenderer, Session,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let orchestrator = ExtractionOrchestrator::from_config(&config)?;
//!     let document = Document::open("claim.pdf", config.download_timeout_secs).await?;
//!
//!     let mut session = Session::new();
//!     match orchestrator.run(&mut session, &document).await? {
//!         ExtractionOutcome::Populated(p) => eprintln!("{} bills", p.bills.len()),
//!         other => eprintln!("{}", other.user_message().unwrap_or_default()),
//!     }
//!
//!     let report_config = ReportConfig::default();
//!     let layout = compile(&session, &report_config);
//!     let rendered = MarkdownReportRenderer::from_config(&report_config).render(&layout)?;
//!     println!("{}", rendered.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `billrecon` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-billrecon = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod anomaly;
pub mod config;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod records;
pub mod report;
pub mod schema;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use anomaly::{Advisory, AnomalyChecker};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, ReportConfig};
pub use error::{AddRejection, BillReconError, Operation, SchemaRejection};
pub use extract::{
    ExtractionFailure, ExtractionOrchestrator, ExtractionOutcome, PopulatedExtraction,
};
pub use ledger::{format_amount, BillLedger, Change, EditCommit, LedgerOp, RowState};
pub use normalize::parse_response;
pub use pipeline::input::{Document, DocumentId};
pub use pipeline::remote::{LlmRemote, RemoteModel};
pub use pipeline::render::{PageImageSource, PdfiumPageSource};
pub use pipeline::encode::PageImage;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use records::{
    BillDraft, BillId, BillLineItem, ExtractionResult, PatientField, PatientRecord,
    PolicyHolderField, PolicyHolderRecord,
};
pub use report::{
    compile, write_report, MarkdownReportRenderer, RenderedReport, ReportLayout, ReportRenderer,
};
pub use schema::build_request;
pub use session::{Session, SessionSnapshot};
