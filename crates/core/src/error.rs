use crate::model::{FieldIssue, Stage};

#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    #[error("case requires stage {required} but is at {actual}")]
    WrongStage { required: Stage, actual: Stage },

    #[error("incomplete data: {}", summarise_issues(.0))]
    IncompleteData(Vec<FieldIssue>),

    #[error("case must be at {required} or later (currently {actual})")]
    StageTooEarly { required: Stage, actual: Stage },

    #[error("case not found: {0}")]
    NotFound(String),

    #[error("conflicting write to case {0}")]
    Conflict(String),

    #[error("case {0} is approved and can no longer be changed")]
    CaseClosed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown user or bad credentials")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("case store unavailable: {0}")]
    TransientStore(String),

    #[error("corrupt case document at {path}: {message}", path = path.display())]
    CorruptRecord {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),

    #[error("E2B export failed: {0}")]
    Export(#[from] pv_e2b::E2bError),
}

impl CaseError {
    /// Wraps an I/O failure from the store as a transient error.
    pub(crate) fn store_io(context: &str, err: std::io::Error) -> Self {
        CaseError::TransientStore(format!("{context}: {err}"))
    }

    /// Shorthand for a single-field validation failure.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        CaseError::IncompleteData(vec![FieldIssue::new(field, message)])
    }
}

fn summarise_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.field, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type CaseResult<T> = std::result::Result<T, CaseError>;
