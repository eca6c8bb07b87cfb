//! Partial documents submitted by the stage editors.
//!
//! Every field is optional on the wire: forms send what the user filled in, and the
//! validation module decides whether that is enough to complete the stage.

use super::stage::Stage;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriagePayload {
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(default)]
    pub patient_initials: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub event_description: Option<String>,
}

/// Age arrives as a JSON number from API clients and as a string from HTML number inputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgeInput {
    Whole(i64),
    Text(String),
}

impl AgeInput {
    pub fn as_text(&self) -> String {
        match self {
            AgeInput::Whole(n) => n.to_string(),
            AgeInput::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEntryPayload {
    #[serde(default)]
    pub patient_age: Option<AgeInput>,
    #[serde(default)]
    pub patient_gender: Option<String>,
    #[serde(default)]
    pub patient_dob: Option<String>,
    #[serde(default)]
    pub reporter_type: Option<String>,
    #[serde(default)]
    pub reporter_country: Option<String>,
    #[serde(default)]
    pub product_indication: Option<String>,
    #[serde(default)]
    pub onset_date: Option<String>,
    /// Raw labels; parsed and checked for repeats during validation.
    #[serde(default)]
    pub seriousness_criteria: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodedEventPayload {
    #[serde(default)]
    pub verbatim: Option<String>,
    #[serde(default)]
    pub llt: Option<String>,
    #[serde(default)]
    pub llt_code: Option<String>,
    #[serde(default)]
    pub pt: Option<String>,
    #[serde(default)]
    pub pt_code: Option<String>,
    #[serde(default)]
    pub hlt: Option<String>,
    #[serde(default)]
    pub soc: Option<String>,
}

/// Medical review input. Has no `ime` field; the flag is derived from the coded PTs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalPayload {
    #[serde(default)]
    pub events: Vec<CodedEventPayload>,
    #[serde(default)]
    pub causality: Option<String>,
    #[serde(default)]
    pub listedness: Option<String>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityPayload {
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub checklist: super::case::QcChecklist,
}

/// A submission for exactly one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagePayload {
    Triage(TriagePayload),
    DataEntry(DataEntryPayload),
    Medical(MedicalPayload),
    Quality(QualityPayload),
}

impl StagePayload {
    /// The stage this payload completes.
    pub fn stage(&self) -> Stage {
        match self {
            StagePayload::Triage(_) => Stage::Triage,
            StagePayload::DataEntry(_) => Stage::DataEntry,
            StagePayload::Medical(_) => Stage::MedicalReview,
            StagePayload::Quality(_) => Stage::QualityReview,
        }
    }
}
