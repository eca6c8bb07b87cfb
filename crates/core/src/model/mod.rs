//! Case data model.

mod case;
mod payload;
mod seriousness;
mod stage;

pub use case::{
    Actor, AuditAction, AuditEntry, Case, CodedEvent, DataEntry, DataEntryDraft, FieldIssue,
    MedicalReview, QcChecklist, QualityReview, TriageData,
};
pub use payload::{
    AgeInput, CodedEventPayload, DataEntryPayload, MedicalPayload, QualityPayload, StagePayload,
    TriagePayload,
};
pub use seriousness::{SeriousnessCriteria, SeriousnessCriterion};
pub use stage::{stage_label, Role, Stage};
