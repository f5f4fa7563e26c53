//! Session context: everything the user is reconciling for one document.
//!
//! A [`Session`] holds the ledger, both identity records, the document they
//! came from, and the latest accepted anomaly advisory. It is passed
//! explicitly to the orchestrators; there is no process-wide state. Starting
//! an extraction attempt calls [`Session::reset`] first, so a failed attempt
//! never leaves stale rows next to new ones.

use crate::anomaly::Advisory;
use crate::ledger::BillLedger;
use crate::pipeline::input::{Document, DocumentId};
use crate::records::{
    BillLineItem, PatientField, PatientRecord, PolicyHolderField, PolicyHolderRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The document a session is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentDocument {
    pub id: DocumentId,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    document: Option<CurrentDocument>,
    ledger: BillLedger,
    patient: PatientRecord,
    policy_holder: PolicyHolderRecord,
    advisory: Option<Advisory>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data and bind the session to `document`.
    pub fn reset(&mut self, document: &Document) {
        debug!("Session reset for '{}' ({})", document.name(), document.id());
        *self = Self {
            document: Some(CurrentDocument {
                id: document.id(),
                name: document.name().to_string(),
            }),
            ..Self::default()
        };
    }

    /// Replace ledger contents and identity records wholesale.
    pub(crate) fn seed(
        &mut self,
        bills: Vec<BillLineItem>,
        patient: PatientRecord,
        policy_holder: PolicyHolderRecord,
    ) {
        self.ledger = BillLedger::with_items(bills);
        self.patient = patient;
        self.policy_holder = policy_holder;
    }

    pub fn document(&self) -> Option<&CurrentDocument> {
        self.document.as_ref()
    }

    pub fn ledger(&self) -> &BillLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut BillLedger {
        &mut self.ledger
    }

    pub fn patient(&self) -> &PatientRecord {
        &self.patient
    }

    pub fn policy_holder(&self) -> &PolicyHolderRecord {
        &self.policy_holder
    }

    pub fn patch_patient(&mut self, field: PatientField, value: impl Into<String>) {
        self.patient.set(field, value);
    }

    pub fn patch_policy_holder(&mut self, field: PolicyHolderField, value: impl Into<String>) {
        self.policy_holder.set(field, value);
    }

    pub fn advisory(&self) -> Option<&Advisory> {
        self.advisory.as_ref()
    }

    /// Store `advisory` if it was computed for the current document.
    ///
    /// Returns `false` (and drops it) when the user has since moved on to
    /// another document.
    pub fn accept_advisory(&mut self, advisory: Advisory) -> bool {
        match &self.document {
            Some(doc) if doc.id == advisory.document_id => {
                self.advisory = Some(advisory);
                true
            }
            _ => {
                warn!(
                    "Ignoring advisory for document {}; no longer current",
                    advisory.document_id
                );
                false
            }
        }
    }

    /// Serialisable view of the session for export.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            document: self.document.clone(),
            bills: self.ledger.items().to_vec(),
            total: self.ledger.total(),
            patient: self.patient.clone(),
            policy_holder: self.policy_holder.clone(),
            advisory: self.advisory.as_ref().map(|a| a.text.clone()),
        }
    }
}

/// JSON export shape of a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub document: Option<CurrentDocument>,
    pub bills: Vec<BillLineItem>,
    pub total: f64,
    pub patient: PatientRecord,
    pub policy_holder: PolicyHolderRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}
