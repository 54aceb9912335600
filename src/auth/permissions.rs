//! Object-level access rules per client type
//!
//! Evaluated before an object is returned or written. The rules read
//! self-declared request headers, so they are a policy hook rather than an
//! authentication boundary.
//!
//! Creation goes through the same check as retrieval. That makes legacy
//! nurses read-only: a nurse may view a record but not create a patient or
//! record, which is stricter than applying the rules to reads alone.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::client::ClientType;

/// Message returned with a 403
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

/// Role assumed when `X-User-Role` is absent
pub const DEFAULT_ROLE: &str = "doctor";

/// What the caller wants to do with the object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectAction {
    Retrieve,
    Create,
}

impl fmt::Display for ObjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectAction::Retrieve => write!(f, "retrieve"),
            ObjectAction::Create => write!(f, "create"),
        }
    }
}

/// Access-related request headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessHeaders {
    /// `X-User-Role`
    pub role: Option<String>,
    /// `X-Department`
    pub department: Option<String>,
    /// `X-Patient-Consent`
    pub patient_consent: Option<String>,
}

impl AccessHeaders {
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or(DEFAULT_ROLE)
    }

    /// Consent defaults to granted when the header is absent
    pub fn consent_granted(&self) -> bool {
        self.patient_consent
            .as_deref()
            .map_or(true, |value| value.eq_ignore_ascii_case("true"))
    }
}

/// Whether the request may perform `action` on an object
pub fn has_object_permission(
    client_type: ClientType,
    headers: &AccessHeaders,
    action: ObjectAction,
) -> bool {
    match client_type {
        ClientType::LegacyHospital => match headers.role() {
            "nurse" => action == ObjectAction::Retrieve,
            _ => true,
        },
        // Department scoping grants every department
        ClientType::ModernClinic => true,
        ClientType::MobileApp => headers.consent_granted(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(role: Option<&str>, consent: Option<&str>) -> AccessHeaders {
        AccessHeaders {
            role: role.map(str::to_string),
            department: None,
            patient_consent: consent.map(str::to_string),
        }
    }

    #[test]
    fn test_legacy_nurse_reads_only() {
        let nurse = headers(Some("nurse"), None);
        assert!(has_object_permission(ClientType::LegacyHospital, &nurse, ObjectAction::Retrieve));
        assert!(!has_object_permission(ClientType::LegacyHospital, &nurse, ObjectAction::Create));

        let default_role = AccessHeaders::default();
        assert_eq!(default_role.role(), "doctor");
        assert!(has_object_permission(
            ClientType::LegacyHospital,
            &default_role,
            ObjectAction::Create
        ));
    }

    #[test]
    fn test_modern_always_allowed() {
        let h = AccessHeaders {
            department: Some("cardiology".into()),
            ..Default::default()
        };
        assert!(has_object_permission(ClientType::ModernClinic, &h, ObjectAction::Create));

        let nurse = headers(Some("nurse"), Some("false"));
        assert!(has_object_permission(ClientType::ModernClinic, &nurse, ObjectAction::Create));
    }

    #[test]
    fn test_mobile_requires_consent() {
        let mobile = |consent: Option<&str>, action| {
            has_object_permission(ClientType::MobileApp, &headers(None, consent), action)
        };

        assert!(mobile(None, ObjectAction::Retrieve));
        assert!(mobile(Some("TRUE"), ObjectAction::Retrieve));
        assert!(!mobile(Some("false"), ObjectAction::Retrieve));
        assert!(!mobile(Some("yes"), ObjectAction::Create));
    }
}
