//! Built-in configuration per client type

use crate::client::ClientType;
use crate::db::schemas::ClientConfig;

/// Default configuration for a client type
pub fn default_config(client_type: ClientType) -> ClientConfig {
    match client_type {
        ClientType::LegacyHospital => ClientConfig::new(
            &["email", "first_name", "last_name", "date_of_birth", "phone"],
            false,
            1000,
            false,
        ),
        ClientType::ModernClinic => ClientConfig::new(&["email"], false, 5000, true),
        ClientType::MobileApp => ClientConfig::new(&["email"], false, 10000, true),
    }
}

/// Default configuration for a stored type name; unknown names get the
/// modern clinic default
pub fn default_config_for_name(name: &str) -> ClientConfig {
    default_config(ClientType::parse(name).unwrap_or_default())
}
