//! Response normalisation: raw remote text → [`ExtractionResult`].
//!
//! The remote service is asked for JSON matching [`crate::schema`], but what
//! comes back is only loosely trustworthy: it may be wrapped in a code fence,
//! be empty, miss whole sections, or carry amounts as `"₹ 1,250.00"`.
//!
//! Normalisation is two explicit steps:
//!
//! 1. **Validate**: check the structural shape and return either a borrowed
//!    view of the payload or a [`SchemaRejection`].
//! 2. **Merge**: copy only the declared fields onto blank records, coercing
//!    every value to its declared type.
//!
//! A rejection is never an error for the caller: it is logged and replaced by
//! the blank result, so "no bills found" messaging downstream covers it.

use crate::error::SchemaRejection;
use crate::records::{
    BillDraft, BillField, ExtractionResult, PatientField, PatientRecord, PolicyHolderField,
    PolicyHolderRecord,
};
use crate::schema::{BILLS_KEY, PATIENT_KEY, POLICY_HOLDER_KEY};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Normalise a raw remote response.
///
/// Absent or blank input yields [`ExtractionResult::blank`]. So does any
/// payload that fails validation. Bill order is preserved exactly.
pub fn parse_response(raw: Option<&str>) -> ExtractionResult {
    let text = match raw.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => {
            debug!("Empty extraction response");
            return ExtractionResult::blank();
        }
    };

    let body = strip_code_fences(text);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            let rejection = SchemaRejection::NotJson {
                detail: e.to_string(),
            };
            warn!("Discarding extraction response: {}", rejection);
            return ExtractionResult::blank();
        }
    };

    match validate(&value) {
        Ok(payload) => merge(payload),
        Err(rejection) => {
            warn!("Discarding extraction response: {}", rejection);
            ExtractionResult::blank()
        }
    }
}

// ── Step 0: fences ───────────────────────────────────────────────────────

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n?(.*?)\n?[ \t]*```$").unwrap());

/// Remove one surrounding ```` ```json ... ``` ```` fence, if present.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

// ── Step 1: validate ─────────────────────────────────────────────────────

/// Borrowed view of a payload that passed structural validation.
#[derive(Debug)]
pub struct ValidatedPayload<'a> {
    bills: Vec<&'a Map<String, Value>>,
    patient: &'a Map<String, Value>,
    policy_holder: &'a Map<String, Value>,
}

/// Check the top-level shape: a `bills` array of objects plus both identity objects.
pub fn validate(value: &Value) -> Result<ValidatedPayload<'_>, SchemaRejection> {
    let root = value.as_object().ok_or(SchemaRejection::RootNotObject)?;

    let raw_bills = root
        .get(BILLS_KEY)
        .and_then(Value::as_array)
        .ok_or(SchemaRejection::MissingBills)?;

    let bills = raw_bills
        .iter()
        .enumerate()
        .map(|(index, bill)| {
            bill.as_object()
                .ok_or(SchemaRejection::BillNotObject { index })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let patient = root
        .get(PATIENT_KEY)
        .and_then(Value::as_object)
        .ok_or(SchemaRejection::MissingIdentity { key: PATIENT_KEY })?;

    let policy_holder = root
        .get(POLICY_HOLDER_KEY)
        .and_then(Value::as_object)
        .ok_or(SchemaRejection::MissingIdentity {
            key: POLICY_HOLDER_KEY,
        })?;

    Ok(ValidatedPayload {
        bills,
        patient,
        policy_holder,
    })
}

// ── Step 2: merge ────────────────────────────────────────────────────────

/// Copy the declared fields of a validated payload onto blank records.
pub fn merge(payload: ValidatedPayload<'_>) -> ExtractionResult {
    let bills = payload.bills.into_iter().map(merge_bill).collect();

    let mut patient = PatientRecord::default();
    for (key, value) in payload.patient {
        match PatientField::from_key(key) {
            Some(field) => patient.set(field, string_value(value)),
            None => debug!("Ignoring undeclared patient field '{}'", key),
        }
    }

    let mut policy_holder = PolicyHolderRecord::default();
    for (key, value) in payload.policy_holder {
        match PolicyHolderField::from_key(key) {
            Some(field) => policy_holder.set(field, string_value(value)),
            None => debug!("Ignoring undeclared policy holder field '{}'", key),
        }
    }

    ExtractionResult {
        bills,
        patient,
        policy_holder,
    }
}

fn merge_bill(bill: &Map<String, Value>) -> BillDraft {
    let text = |field: BillField| bill.get(field.key()).map(string_value).unwrap_or_default();
    BillDraft {
        biller_name: text(BillField::BillerName),
        bill_number: text(BillField::BillNumber),
        bill_date: text(BillField::BillDate),
        bill_amount: bill
            .get(BillField::BillAmount.key())
            .map(coerce_amount)
            .unwrap_or(0.0),
    }
}

/// Declared fields are string-valued: scalars are stringified, anything else is blank.
fn string_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

// ── Amount coercion ──────────────────────────────────────────────────────

static RE_CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:₹|rs\.?|inr|\$)\s*|\s*(?:₹|rs\.?|inr|\$)$").unwrap());

/// Coerce a JSON value to a bill amount.
///
/// Numbers and numeric strings are accepted; everything else is 0.
pub fn coerce_amount(value: &Value) -> f64 {
    match value {
        Value::Number(n) => sanitise_amount(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => coerce_amount_str(s),
        _ => 0.0,
    }
}

/// Coerce free text to a bill amount: finite and non-negative, else 0.
pub fn coerce_amount_str(input: &str) -> f64 {
    let stripped = RE_CURRENCY.replace_all(input.trim(), "");
    let digits: String = stripped
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    sanitise_amount(digits.parse::<f64>().unwrap_or(0.0))
}

/// Clamp an already-numeric amount: NaN, infinities and negatives become 0.
pub fn sanitise_amount(n: f64) -> f64 {
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

/// Serde adapter accepting an amount as a number or as text.
pub(crate) fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = <Value as serde::Deserialize>::deserialize(deserializer)?;
    Ok(coerce_amount(&value))
}
