//! The case document and its per-stage sections.
//!
//! One [`Case`] is stored as one YAML document. Section fields stay `None` until the stage that
//! owns them completes; the audit log only grows.

use super::seriousness::SeriousnessCriteria;
use super::stage::{stage_label, Role, Stage};
use chrono::{DateTime, NaiveDate, Utc};
use pv_ids::{CaseId, CaseNumber};
use pv_types::NonEmptyText;
use serde::{Deserialize, Serialize};

/// The user acting on a case, as resolved by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: NonEmptyText,
    pub role: Role,
}

impl Actor {
    pub fn new(username: NonEmptyText, role: Role) -> Self {
        Self { username, role }
    }
}

/// One validation failure, reported against the form field that caused it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Step 1: the four minimum criteria for a valid report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageData {
    pub reporter_name: NonEmptyText,
    pub patient_initials: NonEmptyText,
    pub product_name: NonEmptyText,
    pub event_description: NonEmptyText,
}

/// Step 2, as completed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEntry {
    pub patient_age: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_dob: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_indication: Option<String>,
    pub onset_date: NaiveDate,
    #[serde(default)]
    pub seriousness_criteria: SeriousnessCriteria,
}

/// Step 2, as typed so far. Values are kept as entered so the form can be re-opened unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEntryDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_indication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset_date: Option<String>,
    #[serde(default)]
    pub seriousness_criteria: SeriousnessCriteria,
}

impl From<&DataEntry> for DataEntryDraft {
    fn from(entry: &DataEntry) -> Self {
        Self {
            patient_age: Some(entry.patient_age.to_string()),
            patient_gender: entry.patient_gender.clone(),
            patient_dob: entry.patient_dob.map(|d| d.to_string()),
            reporter_type: entry.reporter_type.clone(),
            reporter_country: entry.reporter_country.clone(),
            product_indication: entry.product_indication.clone(),
            onset_date: Some(entry.onset_date.to_string()),
            seriousness_criteria: entry.seriousness_criteria.clone(),
        }
    }
}

/// One adverse event coded against MedDRA.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbatim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llt_code: Option<String>,
    pub pt: NonEmptyText,
    pub pt_code: NonEmptyText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hlt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soc: Option<String>,
}

/// Step 3. `ime` is derived from the coded PTs when the review is submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReview {
    pub events: Vec<CodedEvent>,
    pub causality: NonEmptyText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listedness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub ime: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcChecklist {
    #[serde(default)]
    pub data_complete: bool,
    #[serde(default)]
    pub coding_verified: bool,
    #[serde(default)]
    pub narrative_reviewed: bool,
}

/// Step 4, recorded at sign-off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub checklist: QcChecklist,
    pub signed_off_by: NonEmptyText,
    pub signed_off_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CaseBookedIn,
    TriageCompleted,
    DataEntryCompleted,
    MedicalReviewCompleted,
    QualityReviewCompleted,
    FieldsEdited,
    CaseReturned,
}

impl AuditAction {
    /// The completion action recorded when `stage` is submitted.
    pub fn completed(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Triage => Some(AuditAction::TriageCompleted),
            Stage::DataEntry => Some(AuditAction::DataEntryCompleted),
            Stage::MedicalReview => Some(AuditAction::MedicalReviewCompleted),
            Stage::QualityReview => Some(AuditAction::QualityReviewCompleted),
            Stage::Approved => None,
        }
    }
}

/// Append-only audit record. `stage` is where the case stood when the action was taken.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    #[serde(with = "stage_label")]
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: CaseId,
    pub case_number: CaseNumber,
    pub sequence: u64,
    pub revision: u64,
    #[serde(flatten)]
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triage: Option<TriageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_entry: Option<DataEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_entry_draft: Option<DataEntryDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical: Option<MedicalReview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReview>,
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
    #[serde(default)]
    pub return_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    /// A fresh case at `stage`, not yet stored (sequence and revision are assigned on insert).
    pub fn blank(id: CaseId, received: DateTime<Utc>, stage: Stage) -> Self {
        Self {
            case_number: CaseNumber::generate(received.date_naive(), &id),
            id,
            sequence: 0,
            revision: 0,
            stage,
            triage: None,
            data_entry: None,
            data_entry_draft: None,
            medical: None,
            quality: None,
            audit_log: Vec::new(),
            return_count: 0,
            created_at: received,
            updated_at: received,
        }
    }

    pub fn record(
        &mut self,
        actor: &Actor,
        action: AuditAction,
        at: DateTime<Utc>,
        detail: Option<String>,
    ) {
        self.audit_log.push(AuditEntry {
            actor: actor.username.to_string(),
            role: actor.role,
            timestamp: at,
            action,
            stage: self.stage,
            detail,
        });
        self.updated_at = at;
    }

    /// Data for pre-filling the data entry form: the saved draft, else the completed section.
    pub fn data_entry_prefill(&self) -> DataEntryDraft {
        match (&self.data_entry_draft, &self.data_entry) {
            (Some(draft), _) => draft.clone(),
            (None, Some(entry)) => DataEntryDraft::from(entry),
            (None, None) => DataEntryDraft::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_case() -> Case {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let mut case = Case::blank(CaseId::new(), at, Stage::DataEntry);
        case.triage = Some(TriageData {
            reporter_name: NonEmptyText::new("Dr. Smith").unwrap(),
            patient_initials: NonEmptyText::new("A.B.").unwrap(),
            product_name: NonEmptyText::new("Acetaminophen 500mg").unwrap(),
            event_description: NonEmptyText::new("Nausea").unwrap(),
        });
        case
    }

    #[test]
    fn yaml_round_trip_keeps_step_and_status() {
        let case = sample_case();
        let yaml = serde_yaml::to_string(&case).unwrap();
        assert!(yaml.contains("currentStep: 2"));
        assert!(yaml.contains("status: Triage Complete"));
        assert!(!yaml.contains("dataEntry:"));

        let back: Case = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, case);
    }

    #[test]
    fn record_stamps_current_stage() {
        let mut case = sample_case();
        let actor = Actor::new(NonEmptyText::new("dataentry1").unwrap(), Role::DataEntry);
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        case.record(&actor, AuditAction::FieldsEdited, at, Some("patientAge".into()));

        let entry = &case.audit_log[0];
        assert_eq!(entry.actor, "dataentry1");
        assert_eq!(entry.stage, Stage::DataEntry);
        assert_eq!(case.updated_at, at);
        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(json["action"], "fields_edited");
        assert_eq!(json["stage"], "Triage Complete");
    }

    #[test]
    fn prefill_falls_back_to_completed_section() {
        let mut case = sample_case();
        assert_eq!(case.data_entry_prefill(), DataEntryDraft::default());

        case.data_entry = Some(DataEntry {
            patient_age: 45,
            patient_gender: Some("Female".into()),
            patient_dob: None,
            reporter_type: None,
            reporter_country: None,
            product_indication: None,
            onset_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            seriousness_criteria: SeriousnessCriteria::new(),
        });
        let prefill = case.data_entry_prefill();
        assert_eq!(prefill.patient_age.as_deref(), Some("45"));
        assert_eq!(prefill.onset_date.as_deref(), Some("2026-10-01"));
    }
}
