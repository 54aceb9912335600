//! Authorization for Chartway
//!
//! Object-level access rules keyed by client type. Authentication of the
//! caller is out of scope; the rules only see declared headers.

pub mod permissions;

pub use permissions::{has_object_permission, AccessHeaders, ObjectAction, PERMISSION_DENIED};
