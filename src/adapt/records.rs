//! Medical record variants
//!
//! Legacy hospitals speak the rigid narrative shape (diagnosis, treatment,
//! notes). Everyone else speaks the flexible shape with a typed payload.
//! The variant is chosen once per request and drives both validation and
//! rendering.

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::client::ClientType;
use crate::db::schemas::{MedicalRecord, RecordType};
use crate::types::FieldErrors;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";

/// How a flexible record is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexibleView {
    /// Payload keys merged into the top level
    Merged,
    /// Payload kept under `data`
    Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordVariant {
    Rigid,
    Flexible(FlexibleView),
}

impl RecordVariant {
    pub fn select(client_type: ClientType) -> Self {
        match client_type {
            ClientType::LegacyHospital => RecordVariant::Rigid,
            ClientType::ModernClinic => RecordVariant::Flexible(FlexibleView::Merged),
            ClientType::MobileApp => RecordVariant::Flexible(FlexibleView::Payload),
        }
    }
}

/// Validated record input, ready to persist once the patient exists
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub patient: i64,
    pub record_type: RecordType,
    pub diagnosis: String,
    pub treatment: String,
    pub notes: String,
    pub flexible_data: Map<String, Value>,
}

impl RecordDraft {
    pub fn into_record(self, created_by: impl Into<String>) -> MedicalRecord {
        MedicalRecord {
            patient: self.patient,
            record_type: self.record_type,
            diagnosis: self.diagnosis,
            treatment: self.treatment,
            notes: self.notes,
            flexible_data: self.flexible_data,
            created_by: created_by.into(),
            ..Default::default()
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Python-style truthiness, used for "non-empty" payload checks
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn patient_id(input: &Map<String, Value>, errors: &mut FieldErrors) -> i64 {
    match input.get("patient") {
        None | Some(Value::Null) => {
            errors.add("patient", REQUIRED);
            0
        }
        Some(Value::Number(n)) => match n.as_i64() {
            Some(id) => id,
            None => {
                errors.add("patient", format!("Invalid pk \"{}\" - object does not exist.", n));
                0
            }
        },
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.add("patient", REQUIRED);
            0
        }
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                errors.add(
                    "patient",
                    "Incorrect type. Expected pk value, received str.",
                );
                0
            }
        },
        Some(other) => {
            errors.add(
                "patient",
                format!("Incorrect type. Expected pk value, received {}.", json_type_name(other)),
            );
            0
        }
    }
}

/// Optional text field; `required` also rejects blank strings
fn text_field(
    input: &Map<String, Value>,
    name: &str,
    required: bool,
    errors: &mut FieldErrors,
) -> String {
    match input.get(name) {
        None | Some(Value::Null) => {
            if required {
                errors.add(name, REQUIRED);
            }
            String::new()
        }
        Some(Value::String(s)) => {
            if required && s.trim().is_empty() {
                errors.add(name, BLANK);
            }
            s.clone()
        }
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(_) => {
            errors.add(name, "Not a valid string.");
            String::new()
        }
    }
}

fn record_type(input: &Map<String, Value>, errors: &mut FieldErrors) -> RecordType {
    match input.get("record_type") {
        None | Some(Value::Null) => RecordType::default(),
        Some(Value::String(s)) => RecordType::parse(s).unwrap_or_else(|| {
            errors.add("record_type", format!("\"{}\" is not a valid choice.", s));
            RecordType::default()
        }),
        Some(other) => {
            errors.add("record_type", format!("\"{}\" is not a valid choice.", other));
            RecordType::default()
        }
    }
}

fn payload(input: &Map<String, Value>, errors: &mut FieldErrors) -> Map<String, Value> {
    match input.get("data") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            errors.add(
                "data",
                format!(
                    "Expected a dictionary of items but got type \"{}\".",
                    json_type_name(other)
                ),
            );
            Map::new()
        }
    }
}

/// Validate a create payload for a variant.
///
/// Every problem is collected before returning. Patient existence is not
/// checked here.
pub fn validate(variant: RecordVariant, input: &Value) -> Result<RecordDraft, FieldErrors> {
    let Some(input) = input.as_object() else {
        return Err(FieldErrors::single(
            "non_field_errors",
            format!(
                "Invalid data. Expected a dictionary, but got {}.",
                json_type_name(input)
            ),
        ));
    };

    let mut errors = FieldErrors::new();
    let patient = patient_id(input, &mut errors);

    let draft = match variant {
        RecordVariant::Rigid => RecordDraft {
            patient,
            record_type: RecordType::General,
            diagnosis: text_field(input, "diagnosis", true, &mut errors),
            treatment: text_field(input, "treatment", true, &mut errors),
            notes: text_field(input, "notes", false, &mut errors),
            flexible_data: Map::new(),
        },
        RecordVariant::Flexible(_) => {
            let record_type = record_type(input, &mut errors);
            let flexible_data = payload(input, &mut errors);

            if let Some(key) = record_type.required_payload_key() {
                if !errors.contains("data") && !is_truthy(flexible_data.get(key)) {
                    let message = match record_type {
                        RecordType::LabResult => "test_name is required for lab results",
                        _ => "medication is required for prescriptions",
                    };
                    errors.add("data", message);
                }
            }

            RecordDraft {
                patient,
                record_type,
                diagnosis: text_field(input, "diagnosis", false, &mut errors),
                treatment: text_field(input, "treatment", false, &mut errors),
                notes: text_field(input, "notes", false, &mut errors),
                flexible_data,
            }
        }
    };

    if errors.is_empty() {
        Ok(draft)
    } else {
        Err(errors)
    }
}

/// Render a record the way the variant's clients expect
pub fn render(record: &MedicalRecord, variant: RecordVariant) -> Map<String, Value> {
    let created_at = Value::String(record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true));
    let mut out = Map::new();

    match variant {
        RecordVariant::Rigid => {
            out.insert("id".into(), Value::from(record.id));
            out.insert("patient".into(), Value::from(record.patient));
            out.insert("diagnosis".into(), Value::from(record.diagnosis.as_str()));
            out.insert("treatment".into(), Value::from(record.treatment.as_str()));
            out.insert("notes".into(), Value::from(record.notes.as_str()));
            out.insert("created_at".into(), created_at);
        }
        RecordVariant::Flexible(FlexibleView::Merged) => {
            out.insert("id".into(), Value::from(record.id));
            out.insert("patient_id".into(), Value::from(record.patient));
            out.insert("record_type".into(), Value::from(record.record_type.as_str()));
            out.insert("created_at".into(), created_at);

            if record.record_type == RecordType::General {
                out.insert("diagnosis".into(), Value::from(record.diagnosis.as_str()));
                out.insert("treatment".into(), Value::from(record.treatment.as_str()));
                out.insert("notes".into(), Value::from(record.notes.as_str()));
            }

            // Payload keys win over the base fields
            for (key, value) in &record.flexible_data {
                out.insert(key.clone(), value.clone());
            }
        }
        RecordVariant::Flexible(FlexibleView::Payload) => {
            out.insert("id".into(), Value::from(record.id));
            out.insert("patient".into(), Value::from(record.patient));
            out.insert("record_type".into(), Value::from(record.record_type.as_str()));
            out.insert("diagnosis".into(), Value::from(record.diagnosis.as_str()));
            out.insert("treatment".into(), Value::from(record.treatment.as_str()));
            out.insert("notes".into(), Value::from(record.notes.as_str()));
            out.insert("data".into(), Value::Object(record.flexible_data.clone()));
            out.insert("created_at".into(), created_at);
        }
    }

    out
}
