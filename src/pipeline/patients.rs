//! Patient create and read

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::info;

use super::{expect_object, Pipeline};
use crate::adapt::records::is_truthy;
use crate::adapt::{project, render_patient, ssn, PatientField};
use crate::auth::{AccessHeaders, ObjectAction};
use crate::client::ClientContext;
use crate::db::memory::DUPLICATE_EMAIL;
use crate::db::schemas::{ClientConfig, Patient};
use crate::types::{FieldErrors, GatewayError, Result};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const INVALID_EMAIL: &str = "Enter a valid email address.";
const INVALID_DATE: &str = "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.";

/// Column limits of the patient table
fn max_length(field: PatientField) -> Option<usize> {
    match field {
        PatientField::Email => Some(254),
        PatientField::FirstName
        | PatientField::LastName
        | PatientField::EmergencyContact
        | PatientField::InsuranceProvider => Some(100),
        PatientField::Phone | PatientField::EmergencyPhone => Some(20),
        PatientField::BloodType => Some(5),
        PatientField::InsuranceNumber => Some(50),
        _ => None,
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
        && domain.contains('.')
}

/// Presence for the required-field check; strings count once trimmed
fn is_filled(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => !s.trim().is_empty(),
        other => is_truthy(other),
    }
}

fn set_text(patient: &mut Patient, field: PatientField, value: String) {
    let slot = match field {
        PatientField::Email => &mut patient.email,
        PatientField::FirstName => &mut patient.first_name,
        PatientField::LastName => &mut patient.last_name,
        PatientField::Phone => &mut patient.phone,
        PatientField::Address => &mut patient.address,
        PatientField::BloodType => &mut patient.blood_type,
        PatientField::Allergies => &mut patient.allergies,
        PatientField::EmergencyContact => &mut patient.emergency_contact,
        PatientField::EmergencyPhone => &mut patient.emergency_phone,
        PatientField::InsuranceProvider => &mut patient.insurance_provider,
        PatientField::InsuranceNumber => &mut patient.insurance_number,
        _ => return,
    };
    *slot = value;
}

fn parse_birth_date(value: Option<&Value>, errors: &mut FieldErrors) -> Option<NaiveDate> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| errors.add("date_of_birth", INVALID_DATE))
            .ok(),
        Some(_) => {
            errors.add("date_of_birth", INVALID_DATE);
            None
        }
    }
}

/// Copy writable fields from the payload. Fields that already carry an
/// error (from the required-field check) are not reported twice.
fn build_patient(input: &Map<String, Value>, errors: &mut FieldErrors) -> Patient {
    let mut patient = Patient::default();

    for field in PatientField::ALL.into_iter().filter(PatientField::is_writable) {
        let name = field.as_str();

        if field == PatientField::DateOfBirth {
            patient.date_of_birth = parse_birth_date(input.get(name), errors);
            continue;
        }

        let text = match input.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(_) => {
                errors.add(name, "Not a valid string.");
                continue;
            }
        };

        if field == PatientField::Email && !errors.contains(name) {
            match text.as_deref() {
                None => errors.add(name, REQUIRED),
                Some("") => errors.add(name, BLANK),
                Some(email) if !is_valid_email(email) => errors.add(name, INVALID_EMAIL),
                Some(_) => {}
            }
        }

        let Some(text) = text else { continue };

        if let Some(limit) = max_length(field) {
            if text.chars().count() > limit {
                errors.add(
                    name,
                    format!("Ensure this field has no more than {} characters.", limit),
                );
            }
        }

        set_text(&mut patient, field, text);
    }

    patient
}

impl Pipeline {
    /// Create a patient and render it in the caller's shape
    pub async fn create_patient(
        &self,
        ctx: &ClientContext,
        access: &AccessHeaders,
        payload: &Value,
    ) -> Result<Map<String, Value>> {
        Self::check_access(ctx, access, ObjectAction::Create)?;

        let input = expect_object(payload)?;
        let config = self.config_for(ctx).await;

        let mut errors = FieldErrors::new();

        for field in &config.required_fields {
            if !is_filled(input.get(field.as_str())) {
                errors.add(field, format!("This field is required for {}", ctx.client_type));
            }
        }

        let mut patient = build_patient(input, &mut errors);

        let ssn_input = match ssn::decode_input(input.get("ssn").unwrap_or(&Value::Null)) {
            Ok(decoded) => decoded,
            Err(message) => {
                errors.add("ssn", message);
                None
            }
        };

        if !errors.contains("email")
            && self
                .storage
                .find_patient_by_email(&patient.email)
                .await?
                .is_some()
        {
            errors.add("email", DUPLICATE_EMAIL);
        }

        errors.into_result()?;

        if let Some(input) = ssn_input {
            ssn::apply(&mut patient, input);
        }

        let patient = self.storage.insert_patient(patient).await?;

        info!(
            patient_id = patient.id,
            client_id = %ctx.client_id,
            client_type = %ctx.client_type,
            "Patient created"
        );

        Ok(self.render_patient_for(ctx, &config, &patient))
    }

    /// Load a patient and render it in the caller's shape
    pub async fn get_patient(
        &self,
        ctx: &ClientContext,
        access: &AccessHeaders,
        id: i64,
    ) -> Result<Map<String, Value>> {
        let patient = self
            .storage
            .get_patient(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("No Patient matches the given query.".into()))?;

        Self::check_access(ctx, access, ObjectAction::Retrieve)?;

        let config = self.config_for(ctx).await;
        Ok(self.render_patient_for(ctx, &config, &patient))
    }

    fn render_patient_for(
        &self,
        ctx: &ClientContext,
        config: &ClientConfig,
        patient: &Patient,
    ) -> Map<String, Value> {
        let requested = if config.allow_field_selection {
            ctx.requested_fields.as_deref()
        } else {
            None
        };

        let fields = project(ctx.client_type, ctx.api_version, requested);
        render_patient(patient, &fields, ctx.api_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("patient@clinic.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("patient"));
        assert!(!is_valid_email("patient@"));
        assert!(!is_valid_email("@clinic.com"));
        assert!(!is_valid_email("p@clinic"));
        assert!(!is_valid_email("p q@clinic.com"));
        assert!(!is_valid_email("p@@clinic.com"));
    }

    #[test]
    fn test_build_patient_copies_writable_fields() {
        let input = json!({
            "email": " p@x.org ",
            "first_name": "Ada",
            "date_of_birth": "1990-05-01",
            "ssn_legacy": "should-not-land",
            "id": 99
        });
        let mut errors = FieldErrors::new();
        let patient = build_patient(input.as_object().unwrap(), &mut errors);

        assert!(errors.is_empty(), "{errors}");
        assert_eq!(patient.email, "p@x.org");
        assert_eq!(patient.first_name, "Ada");
        assert_eq!(patient.date_of_birth, NaiveDate::from_ymd_opt(1990, 5, 1));
        assert!(patient.ssn_legacy.is_empty());
        assert_eq!(patient.id, 0);
    }

    #[test]
    fn test_build_patient_reports_field_errors() {
        let input = json!({
            "email": "not-an-email",
            "date_of_birth": "05/01/1990",
            "blood_type": "TOO-LONG",
            "allergies": ["peanuts"]
        });
        let mut errors = FieldErrors::new();
        build_patient(input.as_object().unwrap(), &mut errors);

        assert_eq!(errors.get("email").unwrap()[0], INVALID_EMAIL);
        assert!(errors.contains("date_of_birth"));
        assert!(errors.contains("blood_type"));
        assert!(errors.contains("allergies"));
    }

    #[test]
    fn test_whitespace_is_not_filled() {
        assert!(!is_filled(Some(&json!("   "))));
        assert!(!is_filled(Some(&json!(""))));
        assert!(!is_filled(None));
        assert!(is_filled(Some(&json!(" Ada "))));
        assert!(is_filled(Some(&json!(42))));
    }

    #[test]
    fn test_missing_email_not_reported_twice() {
        let mut errors = FieldErrors::single("email", "This field is required for legacy_hospital");
        build_patient(&Map::new(), &mut errors);
        assert_eq!(errors.get("email").unwrap().len(), 1);
    }
}
