//! ICH E2B(R3) boundary support.
//!
//! This crate renders an individual case safety report (ICSR) as the HL7 v3
//! `MCCI_IN200100UV01` batch message defined by ICH E2B(R3). It works on a domain-level
//! carrier ([`IcsrMessage`]) so that it has no knowledge of how cases are stored or
//! processed; the workflow crate translates a case into the carrier.
//!
//! Only the subset of the message used by the training workflow is emitted: batch and
//! message wrappers, safety report identifiers, primary reporter, patient characteristics,
//! reactions with MedDRA coding and seriousness criteria, suspect drugs, causality and
//! narrative.

pub mod icsr;
mod writer;

pub use icsr::{
    render, IcsrDrug, IcsrMessage, IcsrPatient, IcsrReaction, IcsrReporter, PatientSex,
    SeriousnessCode,
};

/// Errors returned by the `pv-e2b` crate.
#[derive(Debug, thiserror::Error)]
pub enum E2bError {
    #[error("XML write failed: {0}")]
    Xml(String),

    #[error("missing required element: {0}")]
    MissingField(&'static str),
}

/// Type alias for Results that can fail with an [`E2bError`].
pub type E2bResult<T> = Result<T, E2bError>;
