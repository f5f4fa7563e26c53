//! Domain records: bill line items and the two identity records.
//!
//! Identity records are flat bags of string fields. Every declared field is
//! always present; missing data is the empty string. The declared field list
//! lives in [`PatientField`] / [`PolicyHolderField`] and nowhere else; the
//! output schema, the response merge, and user patches all enumerate it.

use crate::normalize::coerce_amount_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ── Bills ────────────────────────────────────────────────────────────────

/// Opaque, immutable identity of a bill in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillId(Uuid);

impl BillId {
    /// Mint a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BillId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The editable fields of a bill, without an identity.
///
/// Used for extraction output (ids not yet assigned), for manual adds, and as
/// the payload of an update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BillDraft {
    pub biller_name: String,
    pub bill_number: String,
    /// Display format DD-MM-YYYY; not validated.
    pub bill_date: String,
    /// Finite and non-negative.
    #[serde(deserialize_with = "crate::normalize::deserialize_amount")]
    pub bill_amount: f64,
}

impl BillDraft {
    pub fn new(
        biller_name: impl Into<String>,
        bill_number: impl Into<String>,
        bill_date: impl Into<String>,
        bill_amount: f64,
    ) -> Self {
        Self {
            biller_name: biller_name.into(),
            bill_number: bill_number.into(),
            bill_date: bill_date.into(),
            bill_amount,
        }
    }

    /// Build a draft from raw form input; an unparseable amount becomes 0.
    pub fn from_input(biller_name: &str, bill_number: &str, bill_date: &str, amount: &str) -> Self {
        Self::new(
            biller_name,
            bill_number,
            bill_date,
            coerce_amount_str(amount),
        )
    }
}

/// A bill owned by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillLineItem {
    pub id: BillId,
    pub biller_name: String,
    pub bill_number: String,
    pub bill_date: String,
    pub bill_amount: f64,
}

impl BillLineItem {
    pub(crate) fn from_draft(id: BillId, draft: BillDraft) -> Self {
        Self {
            id,
            biller_name: draft.biller_name,
            bill_number: draft.bill_number,
            bill_date: draft.bill_date,
            bill_amount: draft.bill_amount,
        }
    }

    /// Copy of the editable fields.
    pub fn draft(&self) -> BillDraft {
        BillDraft {
            biller_name: self.biller_name.clone(),
            bill_number: self.bill_number.clone(),
            bill_date: self.bill_date.clone(),
            bill_amount: self.bill_amount,
        }
    }

    pub(crate) fn replace_fields(&mut self, draft: BillDraft) {
        self.biller_name = draft.biller_name;
        self.bill_number = draft.bill_number;
        self.bill_date = draft.bill_date;
        self.bill_amount = draft.bill_amount;
    }
}

/// Bill fields as declared to the remote service. All are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillField {
    BillerName,
    BillNumber,
    BillDate,
    BillAmount,
}

impl BillField {
    pub const ALL: [BillField; 4] = [
        BillField::BillerName,
        BillField::BillNumber,
        BillField::BillDate,
        BillField::BillAmount,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BillField::BillerName => "billerName",
            BillField::BillNumber => "billNumber",
            BillField::BillDate => "billDate",
            BillField::BillAmount => "billAmount",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BillField::BillerName => "Hospital, pharmacy or lab that issued the bill",
            BillField::BillNumber => "Bill or invoice number as printed",
            BillField::BillDate => "Bill date in DD-MM-YYYY format",
            BillField::BillAmount => "Total payable amount of the bill, digits only",
        }
    }
}

// ── Identity records ─────────────────────────────────────────────────────

/// Declared patient fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatientField {
    Name,
    AdmissionDateTime,
    DischargeDateTime,
    NationalIdNumber,
    TaxIdNumber,
    DateOfBirth,
    Gender,
}

impl PatientField {
    pub const ALL: [PatientField; 7] = [
        PatientField::Name,
        PatientField::AdmissionDateTime,
        PatientField::DischargeDateTime,
        PatientField::NationalIdNumber,
        PatientField::TaxIdNumber,
        PatientField::DateOfBirth,
        PatientField::Gender,
    ];

    /// JSON key used on the wire.
    pub fn key(self) -> &'static str {
        match self {
            PatientField::Name => "name",
            PatientField::AdmissionDateTime => "admissionDateTime",
            PatientField::DischargeDateTime => "dischargeDateTime",
            PatientField::NationalIdNumber => "nationalIdNumber",
            PatientField::TaxIdNumber => "taxIdNumber",
            PatientField::DateOfBirth => "dateOfBirth",
            PatientField::Gender => "gender",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PatientField::Name => "Patient name",
            PatientField::AdmissionDateTime => "Admission date and time",
            PatientField::DischargeDateTime => "Discharge date and time",
            PatientField::NationalIdNumber => "National ID number",
            PatientField::TaxIdNumber => "Tax ID number",
            PatientField::DateOfBirth => "Date of birth",
            PatientField::Gender => "Gender",
        }
    }

    pub fn required(self) -> bool {
        matches!(
            self,
            PatientField::Name | PatientField::AdmissionDateTime | PatientField::DischargeDateTime
        )
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Patient identity, one per session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientRecord {
    pub name: String,
    pub admission_date_time: String,
    pub discharge_date_time: String,
    pub national_id_number: String,
    pub tax_id_number: String,
    pub date_of_birth: String,
    pub gender: String,
}

impl PatientRecord {
    pub fn get(&self, field: PatientField) -> &str {
        match field {
            PatientField::Name => &self.name,
            PatientField::AdmissionDateTime => &self.admission_date_time,
            PatientField::DischargeDateTime => &self.discharge_date_time,
            PatientField::NationalIdNumber => &self.national_id_number,
            PatientField::TaxIdNumber => &self.tax_id_number,
            PatientField::DateOfBirth => &self.date_of_birth,
            PatientField::Gender => &self.gender,
        }
    }

    pub fn set(&mut self, field: PatientField, value: impl Into<String>) {
        let slot = match field {
            PatientField::Name => &mut self.name,
            PatientField::AdmissionDateTime => &mut self.admission_date_time,
            PatientField::DischargeDateTime => &mut self.discharge_date_time,
            PatientField::NationalIdNumber => &mut self.national_id_number,
            PatientField::TaxIdNumber => &mut self.tax_id_number,
            PatientField::DateOfBirth => &mut self.date_of_birth,
            PatientField::Gender => &mut self.gender,
        };
        *slot = value.into();
    }

    pub fn is_blank(&self) -> bool {
        PatientField::ALL.iter().all(|f| self.get(*f).is_empty())
    }
}

/// Declared policy-holder fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyHolderField {
    Name,
    Address,
    NationalIdNumber,
    TaxIdNumber,
    Email,
    PhoneNumber,
    BankName,
    BankAccountNumber,
    BankBranchCode,
    PolicyNumber,
}

impl PolicyHolderField {
    pub const ALL: [PolicyHolderField; 10] = [
        PolicyHolderField::Name,
        PolicyHolderField::Address,
        PolicyHolderField::NationalIdNumber,
        PolicyHolderField::TaxIdNumber,
        PolicyHolderField::Email,
        PolicyHolderField::PhoneNumber,
        PolicyHolderField::BankName,
        PolicyHolderField::BankAccountNumber,
        PolicyHolderField::BankBranchCode,
        PolicyHolderField::PolicyNumber,
    ];

    pub fn key(self) -> &'static str {
        match self {
            PolicyHolderField::Name => "name",
            PolicyHolderField::Address => "address",
            PolicyHolderField::NationalIdNumber => "nationalIdNumber",
            PolicyHolderField::TaxIdNumber => "taxIdNumber",
            PolicyHolderField::Email => "email",
            PolicyHolderField::PhoneNumber => "phoneNumber",
            PolicyHolderField::BankName => "bankName",
            PolicyHolderField::BankAccountNumber => "bankAccountNumber",
            PolicyHolderField::BankBranchCode => "bankBranchCode",
            PolicyHolderField::PolicyNumber => "policyNumber",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PolicyHolderField::Name => "Policy holder name",
            PolicyHolderField::Address => "Postal address",
            PolicyHolderField::NationalIdNumber => "National ID number",
            PolicyHolderField::TaxIdNumber => "Tax ID number",
            PolicyHolderField::Email => "Email address",
            PolicyHolderField::PhoneNumber => "Phone number",
            PolicyHolderField::BankName => "Bank name",
            PolicyHolderField::BankAccountNumber => "Bank account number",
            PolicyHolderField::BankBranchCode => "Bank branch code",
            PolicyHolderField::PolicyNumber => "Insurance policy number",
        }
    }

    pub fn required(self) -> bool {
        matches!(self, PolicyHolderField::Name | PolicyHolderField::PolicyNumber)
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Policy-holder identity and banking details, one per session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyHolderRecord {
    pub name: String,
    pub address: String,
    pub national_id_number: String,
    pub tax_id_number: String,
    pub email: String,
    pub phone_number: String,
    pub bank_name: String,
    pub bank_account_number: String,
    pub bank_branch_code: String,
    pub policy_number: String,
}

impl PolicyHolderRecord {
    pub fn get(&self, field: PolicyHolderField) -> &str {
        match field {
            PolicyHolderField::Name => &self.name,
            PolicyHolderField::Address => &self.address,
            PolicyHolderField::NationalIdNumber => &self.national_id_number,
            PolicyHolderField::TaxIdNumber => &self.tax_id_number,
            PolicyHolderField::Email => &self.email,
            PolicyHolderField::PhoneNumber => &self.phone_number,
            PolicyHolderField::BankName => &self.bank_name,
            PolicyHolderField::BankAccountNumber => &self.bank_account_number,
            PolicyHolderField::BankBranchCode => &self.bank_branch_code,
            PolicyHolderField::PolicyNumber => &self.policy_number,
        }
    }

    pub fn set(&mut self, field: PolicyHolderField, value: impl Into<String>) {
        let slot = match field {
            PolicyHolderField::Name => &mut self.name,
            PolicyHolderField::Address => &mut self.address,
            PolicyHolderField::NationalIdNumber => &mut self.national_id_number,
            PolicyHolderField::TaxIdNumber => &mut self.tax_id_number,
            PolicyHolderField::Email => &mut self.email,
            PolicyHolderField::PhoneNumber => &mut self.phone_number,
            PolicyHolderField::BankName => &mut self.bank_name,
            PolicyHolderField::BankAccountNumber => &mut self.bank_account_number,
            PolicyHolderField::BankBranchCode => &mut self.bank_branch_code,
            PolicyHolderField::PolicyNumber => &mut self.policy_number,
        };
        *slot = value.into();
    }

    pub fn is_blank(&self) -> bool {
        PolicyHolderField::ALL.iter().all(|f| self.get(*f).is_empty())
    }
}

// ── Extraction result ────────────────────────────────────────────────────

/// Normalised output of one extraction call; consumed once to seed a session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub bills: Vec<BillDraft>,
    pub patient: PatientRecord,
    pub policy_holder: PolicyHolderRecord,
}

impl ExtractionResult {
    /// No bills and fully blank identity records.
    pub fn blank() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bill_ids_are_unique() {
        let a = BillId::new();
        let b = BillId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn draft_from_input_coerces_bad_amount_to_zero() {
        let d = BillDraft::from_input("City Clinic", "B-1", "01-01-2024", "twelve");
        assert_eq!(d.bill_amount, 0.0);
        let d = BillDraft::from_input("City Clinic", "B-1", "01-01-2024", "1,250.75");
        assert_eq!(d.bill_amount, 1250.75);
    }

    #[test]
    fn patient_field_keys_round_trip() {
        for field in PatientField::ALL {
            assert_eq!(PatientField::from_key(field.key()), Some(field));
        }
        assert_eq!(PatientField::from_key("policyNumber"), None);
    }

    #[test]
    fn policy_holder_set_and_get() {
        let mut p = PolicyHolderRecord::default();
        assert!(p.is_blank());
        p.set(PolicyHolderField::PolicyNumber, "P-77");
        assert_eq!(p.get(PolicyHolderField::PolicyNumber), "P-77");
        assert_eq!(p.policy_number, "P-77");
        assert!(!p.is_blank());
    }

    #[test]
    fn required_subsets() {
        let patient: Vec<_> = PatientField::ALL
            .into_iter()
            .filter(|f| f.required())
            .map(|f| f.key())
            .collect();
        assert_eq!(patient, ["name", "admissionDateTime", "dischargeDateTime"]);

        let holder: Vec<_> = PolicyHolderField::ALL
            .into_iter()
            .filter(|f| f.required())
            .map(|f| f.key())
            .collect();
        assert_eq!(holder, ["name", "policyNumber"]);
    }

    #[test]
    fn line_item_serialises_camel_case() {
        let item = BillLineItem::from_draft(
            BillId::new(),
            BillDraft::new("City Clinic", "B-1", "01-01-2024", 150.5),
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["billerName"], "City Clinic");
        assert_eq!(json["billAmount"], 150.5);
        assert!(json["id"].is_string());
    }
}
