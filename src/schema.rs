//! The structured-output contract sent to the remote extraction service.
//!
//! The schema is generated from the declared-field enums in
//! [`crate::records`], so adding a field there updates the request, the
//! normaliser, and the session patch API together.

use crate::pipeline::encode::PageImage;
use crate::prompts::{ANOMALY_INSTRUCTION, EXTRACTION_INSTRUCTION};
use crate::records::{BillField, PatientField, PolicyHolderField};
use serde_json::{json, Map, Value};

/// Top-level key holding the bill array.
pub const BILLS_KEY: &str = "bills";
/// Top-level key holding the patient object.
pub const PATIENT_KEY: &str = "patientDetails";
/// Top-level key holding the policy-holder object.
pub const POLICY_HOLDER_KEY: &str = "policyHolderDetails";

/// Everything the remote extraction capability needs for one call.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub instruction: String,
    /// JSON-Schema descriptor of the expected reply.
    pub schema: Value,
    /// Page images in document order.
    pub images: Vec<PageImage>,
}

impl ExtractionRequest {
    /// Instruction and schema rendered as one text block, for providers that
    /// only accept the schema inline.
    pub fn prompt(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        format!(
            "{}\n\nReply with a single JSON object that validates against this JSON Schema:\n{}",
            self.instruction, schema
        )
    }
}

/// Everything the remote anomaly capability needs for one call.
#[derive(Debug, Clone)]
pub struct AnomalyRequest {
    pub instruction: String,
    pub images: Vec<PageImage>,
}

/// Build an extraction request with the built-in instruction.
pub fn build_request(images: Vec<PageImage>) -> ExtractionRequest {
    build_request_with(EXTRACTION_INSTRUCTION, images)
}

/// Build an extraction request with a caller-supplied instruction.
pub fn build_request_with(instruction: &str, images: Vec<PageImage>) -> ExtractionRequest {
    ExtractionRequest {
        instruction: instruction.to_string(),
        schema: output_schema(),
        images,
    }
}

/// Build an anomaly request; `None` uses the built-in instruction.
pub fn build_anomaly_request(instruction: Option<&str>, images: Vec<PageImage>) -> AnomalyRequest {
    AnomalyRequest {
        instruction: instruction.unwrap_or(ANOMALY_INSTRUCTION).to_string(),
        images,
    }
}

/// The JSON-Schema descriptor of a valid extraction reply.
pub fn output_schema() -> Value {
    let patient = string_object(
        PatientField::ALL
            .into_iter()
            .map(|f| (f.key(), f.label(), f.required())),
    );
    let policy_holder = string_object(
        PolicyHolderField::ALL
            .into_iter()
            .map(|f| (f.key(), f.label(), f.required())),
    );

    let mut bill_props = Map::new();
    for field in BillField::ALL {
        let ty = match field {
            BillField::BillAmount => "number",
            _ => "string",
        };
        bill_props.insert(
            field.key().to_string(),
            json!({ "type": ty, "description": field.description() }),
        );
    }
    let bill_required: Vec<&str> = BillField::ALL.into_iter().map(BillField::key).collect();

    json!({
        "type": "object",
        "properties": {
            PATIENT_KEY: patient,
            POLICY_HOLDER_KEY: policy_holder,
            BILLS_KEY: {
                "type": "array",
                "description": "Every bill in the document, in the order it appears",
                "items": {
                    "type": "object",
                    "properties": bill_props,
                    "required": bill_required,
                }
            }
        },
        "required": [PATIENT_KEY, POLICY_HOLDER_KEY, BILLS_KEY],
    })
}

fn string_object<'a>(fields: impl Iterator<Item = (&'a str, &'a str, bool)>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (key, label, is_required) in fields {
        properties.insert(
            key.to_string(),
            json!({ "type": "string", "description": label }),
        );
        if is_required {
            required.push(key);
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_of(v: &Value) -> Vec<&str> {
        v["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|x| x.as_str().unwrap())
            .collect()
    }

    #[test]
    fn schema_required_subsets() {
        let s = output_schema();
        assert_eq!(
            required_of(&s),
            vec![PATIENT_KEY, POLICY_HOLDER_KEY, BILLS_KEY]
        );
        assert_eq!(
            required_of(&s["properties"][PATIENT_KEY]),
            vec!["name", "admissionDateTime", "dischargeDateTime"]
        );
        assert_eq!(
            required_of(&s["properties"][POLICY_HOLDER_KEY]),
            vec!["name", "policyNumber"]
        );
        assert_eq!(
            required_of(&s["properties"][BILLS_KEY]["items"]),
            vec!["billerName", "billNumber", "billDate", "billAmount"]
        );
    }

    #[test]
    fn schema_declares_every_identity_field() {
        let s = output_schema();
        let patient = s["properties"][PATIENT_KEY]["properties"]
            .as_object()
            .unwrap();
        assert_eq!(patient.len(), PatientField::ALL.len());
        let holder = s["properties"][POLICY_HOLDER_KEY]["properties"]
            .as_object()
            .unwrap();
        assert_eq!(holder.len(), PolicyHolderField::ALL.len());
        assert_eq!(
            s["properties"][BILLS_KEY]["items"]["properties"]["billAmount"]["type"],
            "number"
        );
    }

    #[test]
    fn request_carries_images_in_order() {
        let images = vec![
            PageImage::png(1, vec![1, 2, 3]),
            PageImage::png(2, vec![4, 5, 6]),
        ];
        let req = build_request(images);
        assert_eq!(req.instruction, EXTRACTION_INSTRUCTION);
        let pages: Vec<_> = req.images.iter().map(|i| i.page_num).collect();
        assert_eq!(pages, [1, 2]);
        assert!(req.prompt().contains("\"policyHolderDetails\""));
    }

    #[test]
    fn anomaly_request_uses_override() {
        let req = build_anomaly_request(Some("Look for duplicates."), vec![]);
        assert_eq!(req.instruction, "Look for duplicates.");
        let req = build_anomaly_request(None, vec![]);
        assert_eq!(req.instruction, ANOMALY_INSTRUCTION);
    }
}
