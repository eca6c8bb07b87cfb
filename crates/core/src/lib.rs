//! # PV Core
//!
//! Core business logic for the SkyVigilance training case-processing system.
//!
//! This crate holds the pure data operations:
//! - The case model and its four-stage workflow (Triage, Data Entry, Medical Review,
//!   Quality Review, then Approved)
//! - Per-stage completion rules and the stage/role gate
//! - Case storage behind [`CaseStore`], in memory or as sharded YAML documents
//! - Role queues, dashboard totals and E2B(R3) export
//!
//! **No API concerns**: HTTP routing, header parsing and status codes belong in `api-rest`
//! and `api-shared`.

pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod identity;
pub mod model;
pub mod store;
pub mod validation;
pub mod workflow;

pub use config::CoreConfig;
pub use error::{CaseError, CaseResult};
pub use identity::{Account, IdentityProvider, StaticAccounts};
pub use model::{
    Actor, AuditAction, AuditEntry, Case, DataEntryPayload, FieldIssue, MedicalPayload,
    QualityPayload, Role, SeriousnessCriterion, Stage, StagePayload, TriagePayload,
};
pub use pv_ids::{CaseId, CaseNumber};
pub use pv_types::NonEmptyText;
pub use store::{CaseStore, FileCaseStore, MemoryCaseStore, WriteTicket};
pub use workflow::{CaseService, CaseStats, StageCount};

use serde::de::DeserializeOwned;

/// Parses a YAML document, reporting the failing field path with the message.
pub(crate) fn parse_yaml<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let deserializer = serde_yaml::Deserializer::from_str(text);
    serde_path_to_error::deserialize::<_, T>(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        format!("{} at {}", err.inner(), path)
    })
}
