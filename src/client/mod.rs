//! Client classification
//!
//! Every request declares who it comes from through the `X-Client-ID`
//! header. The identifier is matched against a few well-known substrings to
//! decide which client class the request belongs to:
//!
//! | identifier contains      | client type       |
//! |--------------------------|-------------------|
//! | `hospital` or `legacy`   | `legacy_hospital` |
//! | `mobile` or `app`        | `mobile_app`      |
//! | anything else            | `modern_clinic`   |
//!
//! Matching is case-insensitive and the first row that matches wins.
//!
//! ## Trust
//!
//! The identifier is client-supplied and is NOT authenticated. Anyone can
//! claim to be `legacy_hospital_1`. Classification only picks a data shape;
//! tenant isolation needs real authentication layered in front of Chartway.

pub mod context;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use context::{parse_field_list, version_from_accept, ClientContext};

/// Client classes served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Hospital systems that only understand the flat v1 shapes
    LegacyHospital,
    /// Clinics on the current API (default)
    #[default]
    ModernClinic,
    /// Mobile apps, which may request sparse field sets
    MobileApp,
}

impl ClientType {
    pub const ALL: [ClientType; 3] = [
        ClientType::LegacyHospital,
        ClientType::ModernClinic,
        ClientType::MobileApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::LegacyHospital => "legacy_hospital",
            ClientType::ModernClinic => "modern_clinic",
            ClientType::MobileApp => "mobile_app",
        }
    }

    /// Parse the wire name of a client type
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "legacy_hospital" => Some(ClientType::LegacyHospital),
            "modern_clinic" => Some(ClientType::ModernClinic),
            "mobile_app" => Some(ClientType::MobileApp),
            _ => None,
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the client type from a declared client identifier.
pub fn classify(client_id: &str) -> ClientType {
    let id = client_id.to_lowercase();

    if id.contains("hospital") || id.contains("legacy") {
        ClientType::LegacyHospital
    } else if id.contains("mobile") || id.contains("app") {
        ClientType::MobileApp
    } else {
        ClientType::ModernClinic
    }
}

/// API versions negotiated through the `Accept` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
    V3,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
            ApiVersion::V3 => "v3",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "v1" => Some(ApiVersion::V1),
            "v2" => Some(ApiVersion::V2),
            "v3" => Some(ApiVersion::V3),
            _ => None,
        }
    }

    /// v2 and later expose the structured SSN object instead of the flat string
    pub fn uses_structured_ssn(&self) -> bool {
        !matches!(self, ApiVersion::V1)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
