//! The Bill Ledger: the mutable, ordered store of bills for the current
//! document, plus the single open edit session (if any).
//!
//! ## Ordering
//!
//! Ledger order is insertion order. Extraction seeds it in document order and
//! a manual add appends at the end; updates replace fields in place.
//!
//! ## Edit sessions
//!
//! At most one row, or the synthetic "new row" slot, is being edited at a
//! time. The session keeps a snapshot of the pre-edit values so a cancel can
//! restore them. A delete can land while a row is mid-edit, so every edit
//! operation first checks the target still exists and silently discards the
//! session when it does not.

use crate::error::AddRejection;
use crate::normalize::sanitise_amount;
use crate::records::{BillDraft, BillId, BillLineItem};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Whether a row is shown read-only or being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Viewing,
    Editing,
}

/// What an edit session is editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    /// An existing ledger row.
    Existing(BillId),
    /// The blank row used to add a bill.
    NewRow,
}

/// The single open edit session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEdit {
    target: EditTarget,
    /// Pre-edit values; `None` for the new-row slot.
    snapshot: Option<BillDraft>,
    /// Work-in-progress values.
    draft: BillDraft,
}

impl ActiveEdit {
    pub fn target(&self) -> EditTarget {
        self.target
    }

    pub fn snapshot(&self) -> Option<&BillDraft> {
        self.snapshot.as_ref()
    }

    pub fn draft(&self) -> &BillDraft {
        &self.draft
    }
}

/// Result of [`BillLedger::commit_edit`].
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommit {
    /// The new-row draft was accepted and appended.
    Added(BillLineItem),
    /// The edited row was updated in place.
    Updated(BillId),
    /// There was nothing to save: no session, or its row was deleted.
    Discarded,
}

/// A ledger mutation addressed by 1-based row number, for edit scripts.
///
/// ```json
/// [
///   {"op": "update", "row": 2, "billerName": "City Clinic", "billNumber": "B-2",
///    "billDate": "03-01-2024", "billAmount": "1,250.00"},
///   {"op": "delete", "row": 4},
///   {"op": "add", "billerName": "Pharmacy", "billDate": "05-01-2024", "billAmount": 310}
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOp {
    Add {
        #[serde(flatten)]
        bill: BillDraft,
    },
    Update {
        row: usize,
        #[serde(flatten)]
        bill: BillDraft,
    },
    Delete {
        row: usize,
    },
}

/// Effect of applying one [`LedgerOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added(BillId),
    Updated(BillId),
    Deleted(BillId),
    /// Row number did not resolve; nothing changed.
    Unchanged,
}

/// Ordered collection of bills with at most one open edit session.
#[derive(Debug, Clone, Default)]
pub struct BillLedger {
    bills: Vec<BillLineItem>,
    active_edit: Option<ActiveEdit>,
}

impl BillLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger holding `items` in the given order.
    pub fn with_items(items: Vec<BillLineItem>) -> Self {
        Self {
            bills: items,
            active_edit: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.bills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bills.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BillLineItem> {
        self.bills.iter()
    }

    pub fn items(&self) -> &[BillLineItem] {
        &self.bills
    }

    pub fn get(&self, id: BillId) -> Option<&BillLineItem> {
        self.bills.iter().find(|b| b.id == id)
    }

    pub fn contains(&self, id: BillId) -> bool {
        self.get(id).is_some()
    }

    /// Id of the bill at 1-based `row`.
    pub fn id_at(&self, row: usize) -> Option<BillId> {
        row.checked_sub(1)
            .and_then(|i| self.bills.get(i))
            .map(|b| b.id)
    }

    /// Sum of every bill amount, recomputed on each call.
    pub fn total(&self) -> f64 {
        self.bills.iter().map(|b| b.bill_amount).sum()
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Append a manually entered bill.
    ///
    /// Rejected without mutation unless biller name and bill date are
    /// non-blank and the amount is greater than zero.
    pub fn add(&mut self, draft: BillDraft) -> Result<BillLineItem, AddRejection> {
        let draft = validate_new(draft)?;
        let item = BillLineItem::from_draft(BillId::new(), draft);
        debug!("Ledger add {} ({})", item.id, item.biller_name);
        self.bills.push(item.clone());
        Ok(item)
    }

    /// Replace every field except the id, keeping the row's position.
    ///
    /// Returns `false` (and does nothing) when `id` is no longer present.
    pub fn update(&mut self, id: BillId, mut draft: BillDraft) -> bool {
        draft.bill_amount = sanitise_amount(draft.bill_amount);
        match self.bills.iter_mut().find(|b| b.id == id) {
            Some(item) => {
                item.replace_fields(draft);
                debug!("Ledger update {}", id);
                true
            }
            None => {
                debug!("Ledger update {}: row no longer exists", id);
                false
            }
        }
    }

    /// Remove a bill. An edit session open on it is closed without saving.
    pub fn delete(&mut self, id: BillId) -> Option<BillLineItem> {
        if matches!(
            self.active_edit.as_ref().map(|e| e.target),
            Some(EditTarget::Existing(edited)) if edited == id
        ) {
            debug!("Closing edit session on deleted row {}", id);
            self.active_edit = None;
        }
        let pos = self.bills.iter().position(|b| b.id == id)?;
        debug!("Ledger delete {}", id);
        Some(self.bills.remove(pos))
    }

    /// Remove every bill and close any edit session.
    pub fn clear(&mut self) {
        self.bills.clear();
        self.active_edit = None;
    }

    /// Apply one scripted mutation.
    pub fn apply(&mut self, op: LedgerOp) -> Result<Change, AddRejection> {
        match op {
            LedgerOp::Add { bill } => self.add(bill).map(|item| Change::Added(item.id)),
            LedgerOp::Update { row, bill } => Ok(match self.id_at(row) {
                Some(id) => {
                    if self.update(id, bill) {
                        Change::Updated(id)
                    } else {
                        Change::Unchanged
                    }
                }
                None => Change::Unchanged,
            }),
            LedgerOp::Delete { row } => Ok(self
                .id_at(row)
                .and_then(|id| self.delete(id))
                .map_or(Change::Unchanged, |item| Change::Deleted(item.id))),
        }
    }

    // ── Edit sessions ────────────────────────────────────────────────────

    /// Open an edit session on an existing row.
    ///
    /// Returns `false` if the row does not exist. Any other open session is
    /// discarded without saving.
    pub fn begin_edit(&mut self, id: BillId) -> bool {
        let Some(item) = self.get(id) else {
            return false;
        };
        let snapshot = item.draft();
        self.replace_session(ActiveEdit {
            target: EditTarget::Existing(id),
            draft: snapshot.clone(),
            snapshot: Some(snapshot),
        });
        true
    }

    /// Open an edit session on the blank new-row slot.
    pub fn begin_new_row(&mut self) {
        self.replace_session(ActiveEdit {
            target: EditTarget::NewRow,
            snapshot: None,
            draft: BillDraft::default(),
        });
    }

    /// The open session, if its target still exists.
    pub fn active_edit(&self) -> Option<&ActiveEdit> {
        self.active_edit
            .as_ref()
            .filter(|e| self.target_exists(e.target))
    }

    /// Mutable access to the open session's draft.
    pub fn edit_draft_mut(&mut self) -> Option<&mut BillDraft> {
        self.reconcile_edit();
        self.active_edit.as_mut().map(|e| &mut e.draft)
    }

    /// Viewing/editing state of a row.
    pub fn row_state(&self, id: BillId) -> RowState {
        match self.active_edit().map(|e| e.target) {
            Some(EditTarget::Existing(edited)) if edited == id => RowState::Editing,
            _ => RowState::Viewing,
        }
    }

    /// Save the open session.
    ///
    /// A rejected new-row draft leaves the session open so it can be fixed.
    pub fn commit_edit(&mut self) -> Result<EditCommit, AddRejection> {
        self.reconcile_edit();
        let Some(edit) = self.active_edit.take() else {
            return Ok(EditCommit::Discarded);
        };
        match edit.target {
            EditTarget::Existing(id) => Ok(if self.update(id, edit.draft) {
                EditCommit::Updated(id)
            } else {
                EditCommit::Discarded
            }),
            EditTarget::NewRow => match self.add(edit.draft.clone()) {
                Ok(item) => Ok(EditCommit::Added(item)),
                Err(rejection) => {
                    warn!("New bill rejected: {}", rejection);
                    self.active_edit = Some(edit);
                    Err(rejection)
                }
            },
        }
    }

    /// Close the open session without saving, returning the pre-edit values.
    pub fn cancel_edit(&mut self) -> Option<BillDraft> {
        self.reconcile_edit();
        self.active_edit.take().and_then(|e| e.snapshot)
    }

    fn replace_session(&mut self, edit: ActiveEdit) {
        self.reconcile_edit();
        if let Some(previous) = self.active_edit.replace(edit) {
            debug!("Discarding unsaved edit on {:?}", previous.target);
        }
    }

    fn target_exists(&self, target: EditTarget) -> bool {
        match target {
            EditTarget::Existing(id) => self.contains(id),
            EditTarget::NewRow => true,
        }
    }

    fn reconcile_edit(&mut self) {
        if let Some(edit) = &self.active_edit {
            if !self.target_exists(edit.target) {
                debug!("Dropping edit session on vanished row {:?}", edit.target);
                self.active_edit = None;
            }
        }
    }
}

fn validate_new(mut draft: BillDraft) -> Result<BillDraft, AddRejection> {
    if draft.biller_name.trim().is_empty() {
        return Err(AddRejection::MissingBillerName);
    }
    if draft.bill_date.trim().is_empty() {
        return Err(AddRejection::MissingBillDate);
    }
    draft.bill_amount = sanitise_amount(draft.bill_amount);
    if draft.bill_amount == 0.0 {
        return Err(AddRejection::ZeroAmount);
    }
    Ok(draft)
}

/// Render an amount with two decimals and `,` thousands grouping.
///
/// The live table and the exported report both go through this function so
/// they can never disagree on rounding.
pub fn format_amount(n: f64) -> String {
    let n = if n.is_finite() { n } else { 0.0 };
    let fixed = format!("{:.2}", n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut out = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    if n < 0.0 && fixed != "0.00" {
        out.push('-');
    }
    let digits = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (digits - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.push('.');
    out.push_str(frac_part);
    out
}
