//! Shape adaptation
//!
//! - [`fields`] - which patient fields a client sees
//! - [`ssn`] - legacy and structured SSN reads and writes
//! - [`records`] - rigid and flexible medical record shapes

pub mod fields;
pub mod records;
pub mod ssn;

pub use fields::{catalog, project, render_patient, PatientField};
pub use records::{FlexibleView, RecordDraft, RecordVariant};
pub use ssn::{SsnInput, StructuredSsn};
