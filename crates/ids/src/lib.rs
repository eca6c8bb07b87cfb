//! Case identifiers and sharded-path utilities.
//!
//! Every case carries two identifiers:
//!
//! - [`CaseId`]: the storage identifier, a UUID held in *canonical* form (32 lowercase
//!   hexadecimal characters, no hyphens). Storage paths are derived from it.
//! - [`CaseNumber`]: the human-facing number printed on forms and exports, formatted as
//!   `PV-YYYYMMDD-XXXXXX` where the suffix is six upper-case hex characters.
//!
//! ## Sharded directory layout
//! For a canonical id `u`, cases are stored under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `case_data/cases/55/0e/550e8400e29b41d4a716446655440000/`

mod service;

pub use service::{CaseId, CaseNumber, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type IdResult<T> = Result<T, IdError>;
