//! Error types for the edgequake-billrecon library.
//!
//! Three error types map onto three distinct failure modes:
//!
//! * [`BillReconError`]: an operation could not complete (document could not
//!   be opened, remote service failed, an attempt is already in flight). The
//!   orchestrators catch these at their boundary and turn them into an
//!   outcome; nothing below the orchestrators sees a raw transport error.
//!
//! * [`SchemaRejection`]: the remote service answered, but its JSON did not
//!   have the declared shape. Always recovered locally by substituting the
//!   blank extraction; only ever logged.
//!
//! * [`AddRejection`]: a manually added bill is missing a required field.
//!   Returned synchronously from [`crate::ledger::BillLedger::add`]; the
//!   ledger is left untouched.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The two kinds of remote work that are each limited to one in-flight attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Extraction,
    AnomalyCheck,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Extraction => f.write_str("extraction"),
            Operation::AnomalyCheck => f.write_str("anomaly check"),
        }
    }
}

/// All operation-level errors returned by the edgequake-billrecon library.
#[derive(Debug, Error)]
pub enum BillReconError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    DocumentNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The document was read, but is not a PDF.
    #[error("Document is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// The pdfium shared library could not be loaded.
    #[error(
        "PDFium library could not be loaded: {detail}\n\
  • Install libpdfium system-wide, or\n\
  • Set PDFIUM_LIB_PATH to the directory containing it."
    )]
    PdfiumUnavailable { detail: String },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Document '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("Document '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for document '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened but has no pages to read.
    #[error("Document '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Remote service errors ─────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The remote service returned an error or the transport failed.
    #[error("Remote service error: {message}")]
    ServiceFailure { message: String },

    /// The remote call did not finish within the configured timeout.
    #[error("Remote call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    // ── Concurrency ───────────────────────────────────────────────────────
    /// An attempt of the same kind has not settled yet.
    #[error("An {operation} is already in progress; wait for it to finish")]
    Busy { operation: Operation },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the report file.
    #[error("Failed to write report file '{path}': {source}")]
    ReportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillReconError {
    /// Whether the user can reasonably retry the same document unchanged.
    ///
    /// Network and service hiccups are retryable; a corrupt or
    /// password-protected document will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BillReconError::ServiceFailure { .. }
                | BillReconError::ApiTimeout { .. }
                | BillReconError::DownloadFailed { .. }
                | BillReconError::DownloadTimeout { .. }
        )
    }
}

/// Why a remote extraction payload failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaRejection {
    /// The text (after fence stripping) is not JSON at all.
    #[error("response is not valid JSON: {detail}")]
    NotJson { detail: String },

    /// The top-level JSON value is not an object.
    #[error("response root is not an object")]
    RootNotObject,

    /// `bills` is absent or not an array.
    #[error("'bills' is missing or not an array")]
    MissingBills,

    /// An element of `bills` is not an object.
    #[error("bill #{index} is not an object")]
    BillNotObject { index: usize },

    /// One of the identity objects is absent or not an object.
    #[error("'{key}' is missing or not an object")]
    MissingIdentity { key: &'static str },
}

/// Why [`crate::ledger::BillLedger::add`] refused a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddRejection {
    #[error("biller name is required")]
    MissingBillerName,

    #[error("bill date is required")]
    MissingBillDate,

    #[error("bill amount must be greater than zero")]
    ZeroAmount,
}
