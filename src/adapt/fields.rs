//! Patient field catalog and projection
//!
//! The set of fields a client sees is computed from a fixed catalog per API
//! version, narrowed by client type and an optional explicit selection.
//! Output order is always catalog order.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::ssn;
use crate::client::{ApiVersion, ClientType};
use crate::db::schemas::Patient;

/// Fields that can appear in a patient representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatientField {
    Id,
    /// Computed; shape depends on the API version
    Ssn,
    Email,
    FirstName,
    LastName,
    DateOfBirth,
    Phone,
    Address,
    SsnLegacy,
    SsnNumber,
    SsnVerified,
    SsnVerificationDate,
    BloodType,
    Allergies,
    EmergencyContact,
    EmergencyPhone,
    InsuranceProvider,
    InsuranceNumber,
    CreatedAt,
    UpdatedAt,
}

impl PatientField {
    /// Every field, in catalog order
    pub const ALL: [PatientField; 20] = [
        PatientField::Id,
        PatientField::Ssn,
        PatientField::Email,
        PatientField::FirstName,
        PatientField::LastName,
        PatientField::DateOfBirth,
        PatientField::Phone,
        PatientField::Address,
        PatientField::SsnLegacy,
        PatientField::SsnNumber,
        PatientField::SsnVerified,
        PatientField::SsnVerificationDate,
        PatientField::BloodType,
        PatientField::Allergies,
        PatientField::EmergencyContact,
        PatientField::EmergencyPhone,
        PatientField::InsuranceProvider,
        PatientField::InsuranceNumber,
        PatientField::CreatedAt,
        PatientField::UpdatedAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatientField::Id => "id",
            PatientField::Ssn => "ssn",
            PatientField::Email => "email",
            PatientField::FirstName => "first_name",
            PatientField::LastName => "last_name",
            PatientField::DateOfBirth => "date_of_birth",
            PatientField::Phone => "phone",
            PatientField::Address => "address",
            PatientField::SsnLegacy => "ssn_legacy",
            PatientField::SsnNumber => "ssn_number",
            PatientField::SsnVerified => "ssn_verified",
            PatientField::SsnVerificationDate => "ssn_verification_date",
            PatientField::BloodType => "blood_type",
            PatientField::Allergies => "allergies",
            PatientField::EmergencyContact => "emergency_contact",
            PatientField::EmergencyPhone => "emergency_phone",
            PatientField::InsuranceProvider => "insurance_provider",
            PatientField::InsuranceNumber => "insurance_number",
            PatientField::CreatedAt => "created_at",
            PatientField::UpdatedAt => "updated_at",
        }
    }

    /// One of the four stored SSN columns
    pub fn is_raw_ssn(&self) -> bool {
        matches!(
            self,
            PatientField::SsnLegacy
                | PatientField::SsnNumber
                | PatientField::SsnVerified
                | PatientField::SsnVerificationDate
        )
    }

    /// Structured SSN columns hidden from legacy clients at v1
    fn is_structured_ssn(&self) -> bool {
        matches!(
            self,
            PatientField::SsnNumber | PatientField::SsnVerified | PatientField::SsnVerificationDate
        )
    }

    /// Whether a create payload may set this field directly
    pub fn is_writable(&self) -> bool {
        !matches!(
            self,
            PatientField::Id | PatientField::Ssn | PatientField::CreatedAt | PatientField::UpdatedAt
        ) && !self.is_raw_ssn()
    }
}

/// Full catalog for an API version
pub fn catalog(version: ApiVersion) -> Vec<PatientField> {
    PatientField::ALL
        .into_iter()
        .filter(|field| !version.uses_structured_ssn() || !field.is_raw_ssn())
        .collect()
}

/// Fields a client sees.
///
/// `requested` is only honoured for mobile clients; names outside the
/// catalog are ignored.
pub fn project(
    client_type: ClientType,
    version: ApiVersion,
    requested: Option<&[String]>,
) -> Vec<PatientField> {
    let fields = catalog(version);

    match (client_type, requested) {
        (ClientType::MobileApp, Some(requested)) if !requested.is_empty() => fields
            .into_iter()
            .filter(|field| requested.iter().any(|name| name == field.as_str()))
            .collect(),
        (ClientType::LegacyHospital, _) if version == ApiVersion::V1 => fields
            .into_iter()
            .filter(|field| !field.is_structured_ssn())
            .collect(),
        _ => fields,
    }
}

fn date_value(date: Option<NaiveDate>) -> Value {
    match date {
        Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        None => Value::Null,
    }
}

fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Value of one field for a patient
pub fn field_value(patient: &Patient, field: PatientField, version: ApiVersion) -> Value {
    match field {
        PatientField::Id => Value::from(patient.id),
        PatientField::Ssn => ssn::read(patient, version),
        PatientField::Email => Value::from(patient.email.as_str()),
        PatientField::FirstName => Value::from(patient.first_name.as_str()),
        PatientField::LastName => Value::from(patient.last_name.as_str()),
        PatientField::DateOfBirth => date_value(patient.date_of_birth),
        PatientField::Phone => Value::from(patient.phone.as_str()),
        PatientField::Address => Value::from(patient.address.as_str()),
        PatientField::SsnLegacy => Value::from(patient.ssn_legacy.as_str()),
        PatientField::SsnNumber => Value::from(patient.ssn_number.as_str()),
        PatientField::SsnVerified => Value::Bool(patient.ssn_verified),
        PatientField::SsnVerificationDate => date_value(patient.ssn_verification_date),
        PatientField::BloodType => Value::from(patient.blood_type.as_str()),
        PatientField::Allergies => Value::from(patient.allergies.as_str()),
        PatientField::EmergencyContact => Value::from(patient.emergency_contact.as_str()),
        PatientField::EmergencyPhone => Value::from(patient.emergency_phone.as_str()),
        PatientField::InsuranceProvider => Value::from(patient.insurance_provider.as_str()),
        PatientField::InsuranceNumber => Value::from(patient.insurance_number.as_str()),
        PatientField::CreatedAt => timestamp_value(patient.created_at),
        PatientField::UpdatedAt => timestamp_value(patient.updated_at),
    }
}

/// Render a patient with exactly the given fields
pub fn render_patient(
    patient: &Patient,
    fields: &[PatientField],
    version: ApiVersion,
) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| (field.as_str().to_string(), field_value(patient, *field, version)))
        .collect()
}
