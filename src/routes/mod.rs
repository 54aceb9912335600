//! HTTP routes for the chartway gateway

pub mod clients;
pub mod health;
pub mod patients;
pub mod records;
pub mod response;

pub use clients::{parse_update, update_config};
pub use health::{health_check, version_info, HealthResponse};
pub use patients::{create_patient, get_patient};
pub use records::{create_record, get_record, list_records};
pub use response::{
    detail_response, error_response, header_str, json_response, method_not_allowed,
    not_found_response, parse_body, preflight_response, query_param,
};
