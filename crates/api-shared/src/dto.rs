//! Wire types for the REST surface.
//!
//! Case documents and stage payloads are the core's own serde types, wrapped transparently so
//! the OpenAPI document can name them. Everything else is a small response shape owned here.

use pv_core::model::{FieldIssue, QcChecklist};
use pv_core::{
    Actor, AuditEntry, Case, CaseError, CaseStats, DataEntryPayload, MedicalPayload,
    QualityPayload, TriagePayload,
};
use pv_meddra::TermEntry;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct LoginReq {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserRes {
    pub username: String,
    pub role: String,
    /// Step of the stage this role works; absent for administrators.
    pub step: Option<u8>,
}

impl From<&Actor> for UserRes {
    fn from(actor: &Actor) -> Self {
        Self {
            username: actor.username.to_string(),
            role: actor.role.label().to_string(),
            step: actor.role.step(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct LoginRes {
    pub success: bool,
    pub user: UserRes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldIssueRes {
    pub field: String,
    pub message: String,
}

impl From<FieldIssue> for FieldIssueRes {
    fn from(issue: FieldIssue) -> Self {
        Self {
            field: issue.field,
            message: issue.message,
        }
    }
}

/// Error body for every non-2xx response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldIssueRes>,
}

impl ErrorRes {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Vec::new(),
        }
    }
}

impl From<CaseError> for ErrorRes {
    fn from(err: CaseError) -> Self {
        match err {
            CaseError::IncompleteData(issues) => Self {
                error: "Incomplete data".into(),
                details: issues.into_iter().map(FieldIssueRes::from).collect(),
            },
            other => Self::new(other.to_string()),
        }
    }
}

/// A full case document.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct CaseRes(pub Case);

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Vec<Object>)]
pub struct CaseListRes(pub Vec<Case>);

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Vec<Object>)]
pub struct AuditLogRes(pub Vec<AuditEntry>);

/// Triage minimum criteria: `reporterName`, `patientInitials`, `productName`,
/// `eventDescription`.
#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct TriageReq(pub TriagePayload);

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct DataEntryReq(pub DataEntryPayload);

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct MedicalReq(pub MedicalPayload);

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QualityReq {
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub data_complete: bool,
    #[serde(default)]
    pub coding_verified: bool,
    #[serde(default)]
    pub narrative_reviewed: bool,
}

impl From<QualityReq> for QualityPayload {
    fn from(req: QualityReq) -> Self {
        QualityPayload {
            comments: req.comments,
            checklist: QcChecklist {
                data_complete: req.data_complete,
                coding_verified: req.coding_verified,
                narrative_reviewed: req.narrative_reviewed,
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ReturnReq {
    pub reason: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ToggleSeriousnessReq {
    /// One of `Death`, `Life-threatening`, `Hospitalization`, `Disability`,
    /// `Congenital anomaly`, `Other serious`.
    pub criterion: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResetRes {
    pub removed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageCountRes {
    pub step: u8,
    pub status: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsRes {
    pub total: usize,
    pub by_stage: Vec<StageCountRes>,
    pub reworked: usize,
    pub ime: usize,
}

impl From<CaseStats> for StatsRes {
    fn from(stats: CaseStats) -> Self {
        Self {
            total: stats.total,
            by_stage: stats
                .by_stage
                .into_iter()
                .map(|c| StageCountRes {
                    step: c.step,
                    status: c.stage.status_label().to_string(),
                    count: c.count,
                })
                .collect(),
            reworked: stats.reworked,
            ime: stats.ime,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeddraTermRes {
    pub llt: String,
    pub llt_code: String,
    pub pt: String,
    pub pt_code: String,
    pub hlt: String,
    pub soc: String,
    pub ime: bool,
}

impl MeddraTermRes {
    pub fn new(entry: TermEntry, ime: bool) -> Self {
        Self {
            llt: entry.llt,
            llt_code: entry.llt_code,
            pt: entry.pt,
            pt_code: entry.pt_code,
            hlt: entry.hlt,
            soc: entry.soc,
            ime,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct MeddraSearchRes {
    pub terms: Vec<MeddraTermRes>,
}
