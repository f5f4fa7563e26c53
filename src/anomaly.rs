//! Anomaly check orchestrator: free-form advisory notes on a document.
//!
//! The document is rasterised again (nothing is cached between the two
//! orchestrators) and sent with the advisory instruction. The reply is prose
//! and is returned verbatim. Only one check may be in flight at a time; it is
//! independent of any extraction attempt.
//!
//! An [`Advisory`] carries the [`DocumentId`] it was computed for. Hand it to
//! [`crate::session::Session::accept_advisory`], which drops it if the user
//! has moved on to another document in the meantime.

use crate::config::ExtractionConfig;
use crate::error::{BillReconError, Operation};
use crate::extract::BusyGuard;
use crate::pipeline::input::{Document, DocumentId};
use crate::pipeline::remote::{LlmRemote, RemoteModel};
use crate::pipeline::render::{PageImageSource, PdfiumPageSource};
use crate::schema::build_anomaly_request;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Advisory text for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisory {
    pub document_id: DocumentId,
    pub text: String,
}

pub struct AnomalyChecker<S, R> {
    source: S,
    remote: R,
    instruction: Option<String>,
    busy: AtomicBool,
}

impl AnomalyChecker<PdfiumPageSource, LlmRemote> {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, BillReconError> {
        Ok(Self::new(
            PdfiumPageSource::from_config(config),
            LlmRemote::from_config(config)?,
        )
        .with_instruction(config.anomaly_prompt.clone()))
    }
}

impl<S: PageImageSource, R: RemoteModel> AnomalyChecker<S, R> {
    pub fn new(source: S, remote: R) -> Self {
        Self {
            source,
            remote,
            instruction: None,
            busy: AtomicBool::new(false),
        }
    }

    pub fn with_instruction(mut self, instruction: Option<String>) -> Self {
        self.instruction = instruction;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Request advisory notes for `document`.
    ///
    /// Fails with [`BillReconError::Busy`] while another check is in flight;
    /// otherwise with whatever rasterisation or the remote call raised.
    pub async fn check(&self, document: &Document) -> Result<Advisory, BillReconError> {
        let _guard = BusyGuard::acquire(&self.busy, Operation::AnomalyCheck)?;
        let start = Instant::now();
        info!("Starting anomaly check: {}", document.name());

        let images = self
            .source
            .rasterize(document, &|_: f32| {})
            .await
            .inspect_err(|e| warn!("Anomaly check failed for {}: {}", document.name(), e))?;

        let request = build_anomaly_request(self.instruction.as_deref(), images);
        let text = self
            .remote
            .advise(&request)
            .await
            .inspect_err(|e| warn!("Anomaly check failed for {}: {}", document.name(), e))?;

        info!(
            "Anomaly check for {} finished in {:?} ({} chars)",
            document.name(),
            start.elapsed(),
            text.len()
        );
        Ok(Advisory {
            document_id: document.id(),
            text,
        })
    }
}
