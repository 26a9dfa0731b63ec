//! Roster ingestion: uploaded file → ordered employee records.

pub mod loader;
pub mod record;

pub use loader::{FileKind, RosterLoader, UploadedFile};
pub use record::{Batch, EmployeeRecord, MISSING, fields};
