//! Dual-format SSN handling
//!
//! Patients carry a legacy flat SSN string and a structured SSN. Writes go
//! through [`set_from_string`] or [`set_from_object`] only; reads pick the
//! representation the API version expects.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::ApiVersion;
use crate::db::schemas::Patient;

/// Structured SSN as written by v2+ clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuredSsn {
    pub number: String,
    pub verified: bool,
    pub verification_date: Option<NaiveDate>,
}

/// A decoded `ssn` input value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsnInput {
    Legacy(String),
    Structured(StructuredSsn),
}

const DATE_FORMAT_ERROR: &str =
    "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.";

/// Parse `YYYY-MM-DD` or the date part of an RFC 3339 timestamp
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.date_naive()))
}

/// Decode the `ssn` input field.
///
/// `Ok(None)` means "no SSN write": null, an empty string, or an empty
/// object. Everything is checked here so a bad value fails before the
/// patient is persisted.
pub fn decode_input(value: &Value) -> Result<Option<SsnInput>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(SsnInput::Legacy(s.clone()))),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(map) => {
            let number = match map.get("number") {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(_) => return Err("SSN number must be a string.".to_string()),
            };

            let verified = match map.get("verified") {
                None | Some(Value::Null) => false,
                Some(Value::Bool(b)) => *b,
                Some(_) => return Err("Must be a valid boolean.".to_string()),
            };

            let verification_date = match map.get("verification_date") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(Value::String(s)) => {
                    Some(parse_date(s).ok_or_else(|| DATE_FORMAT_ERROR.to_string())?)
                }
                Some(_) => return Err(DATE_FORMAT_ERROR.to_string()),
            };

            Ok(Some(SsnInput::Structured(StructuredSsn {
                number,
                verified,
                verification_date,
            })))
        }
        _ => Err("Expected an SSN string or object.".to_string()),
    }
}

/// Write the legacy string unless structured data already exists
pub fn set_from_string(patient: &mut Patient, ssn: &str) {
    if patient.ssn_number.is_empty() {
        patient.ssn_legacy = ssn.to_string();
    }
}

/// Write the structured form
pub fn set_from_object(patient: &mut Patient, ssn: StructuredSsn) {
    patient.ssn_number = ssn.number;
    patient.ssn_verified = ssn.verified;
    patient.ssn_verification_date = ssn.verification_date;
}

pub fn apply(patient: &mut Patient, input: SsnInput) {
    match input {
        SsnInput::Legacy(ssn) => set_from_string(patient, &ssn),
        SsnInput::Structured(ssn) => set_from_object(patient, ssn),
    }
}

/// The `ssn` value a client at `version` sees
pub fn read(patient: &Patient, version: ApiVersion) -> Value {
    if !version.uses_structured_ssn() {
        return if !patient.ssn_legacy.is_empty() {
            Value::from(patient.ssn_legacy.as_str())
        } else if !patient.ssn_number.is_empty() {
            Value::from(patient.ssn_number.as_str())
        } else {
            Value::Null
        };
    }

    if !patient.ssn_number.is_empty() {
        json!({
            "number": patient.ssn_number,
            "verified": patient.ssn_verified,
            "verification_date": patient
                .ssn_verification_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
        })
    } else if !patient.ssn_legacy.is_empty() {
        json!({
            "number": patient.ssn_legacy,
            "verified": false,
            "verification_date": null,
        })
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_write_reads_back_in_both_shapes() {
        let mut patient = Patient::default();
        set_from_string(&mut patient, "123-45-6789");

        assert_eq!(read(&patient, ApiVersion::V1), json!("123-45-6789"));
        assert_eq!(
            read(&patient, ApiVersion::V2),
            json!({"number": "123-45-6789", "verified": false, "verification_date": null})
        );
    }

    #[test]
    fn test_structured_wins_over_later_string() {
        let mut patient = Patient::default();
        set_from_object(
            &mut patient,
            StructuredSsn {
                number: "A".into(),
                verified: true,
                verification_date: None,
            },
        );
        set_from_string(&mut patient, "B");

        assert_eq!(patient.ssn_number, "A");
        assert!(patient.ssn_verified);
        assert!(patient.ssn_legacy.is_empty());
        assert_eq!(read(&patient, ApiVersion::V1), json!("A"));
    }

    #[test]
    fn test_v1_prefers_legacy_column() {
        let patient = Patient {
            ssn_legacy: "legacy".into(),
            ssn_number: "structured".into(),
            ..Default::default()
        };
        assert_eq!(read(&patient, ApiVersion::V1), json!("legacy"));
        assert_eq!(read(&patient, ApiVersion::V3)["number"], "structured");
    }

    #[test]
    fn test_no_ssn_reads_null() {
        let patient = Patient::default();
        assert_eq!(read(&patient, ApiVersion::V1), Value::Null);
        assert_eq!(read(&patient, ApiVersion::V2), Value::Null);
    }

    #[test]
    fn test_decode_empty_values_skip_write() {
        assert_eq!(decode_input(&Value::Null), Ok(None));
        assert_eq!(decode_input(&json!("")), Ok(None));
        assert_eq!(decode_input(&json!({})), Ok(None));
    }

    #[test]
    fn test_decode_object_with_dates() {
        let decoded = decode_input(&json!({
            "number": "444-55-6666",
            "verified": true,
            "verification_date": "2024-01-15"
        }))
        .unwrap();

        assert_eq!(
            decoded,
            Some(SsnInput::Structured(StructuredSsn {
                number: "444-55-6666".into(),
                verified: true,
                verification_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            }))
        );

        let from_timestamp =
            decode_input(&json!({"verification_date": "2024-01-15T10:00:00Z"})).unwrap();
        match from_timestamp {
            Some(SsnInput::Structured(ssn)) => {
                assert_eq!(ssn.verification_date, NaiveDate::from_ymd_opt(2024, 1, 15));
                assert!(ssn.number.is_empty());
                assert!(!ssn.verified);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_input(&json!({"verification_date": "15/01/2024"})).is_err());
        assert!(decode_input(&json!(123456789)).is_err());
        assert!(decode_input(&json!(["1"])).is_err());
    }
}
