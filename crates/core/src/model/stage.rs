//! Workflow stages and the roles that act on them.
//!
//! A case sits at exactly one [`Stage`]. On the wire and on disk the stage is written as two
//! fields, `currentStep` (1-5) and `status` (the dashboard label), so both vocabularies used by
//! the forms stay readable. Parsing accepts either one.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Triage,
    DataEntry,
    MedicalReview,
    QualityReview,
    Approved,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Triage,
        Stage::DataEntry,
        Stage::MedicalReview,
        Stage::QualityReview,
        Stage::Approved,
    ];

    /// Step number shown on the forms (1-5).
    pub fn step(self) -> u8 {
        match self {
            Stage::Triage => 1,
            Stage::DataEntry => 2,
            Stage::MedicalReview => 3,
            Stage::QualityReview => 4,
            Stage::Approved => 5,
        }
    }

    pub fn from_step(step: u8) -> Option<Self> {
        Stage::ALL.into_iter().find(|s| s.step() == step)
    }

    /// Dashboard status label: what has been completed so far.
    pub fn status_label(self) -> &'static str {
        match self {
            Stage::Triage => "New",
            Stage::DataEntry => "Triage Complete",
            Stage::MedicalReview => "Data Entry Complete",
            Stage::QualityReview => "Medical Review Complete",
            Stage::Approved => "Approved",
        }
    }

    /// Working label: the step the case is waiting in.
    pub fn working_label(self) -> &'static str {
        match self {
            Stage::Triage => "Triage",
            Stage::DataEntry => "Data Entry",
            Stage::MedicalReview => "Medical Review",
            Stage::QualityReview => "Quality Review",
            Stage::Approved => "Approved",
        }
    }

    /// Parses a status label, a working label or a step number.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if let Ok(step) = trimmed.parse::<u8>() {
            return Stage::from_step(step);
        }
        Stage::ALL.into_iter().find(|s| {
            s.status_label().eq_ignore_ascii_case(trimmed)
                || s.working_label().eq_ignore_ascii_case(trimmed)
        })
    }

    /// The stage a successful submission moves to.
    pub fn next(self) -> Option<Stage> {
        Stage::from_step(self.step() + 1)
    }

    /// The stage a rework return sends the case back to.
    pub fn return_target(self) -> Option<Stage> {
        match self {
            Stage::MedicalReview => Some(Stage::DataEntry),
            Stage::QualityReview => Some(Stage::MedicalReview),
            _ => None,
        }
    }

    /// True when `to` is an edge of the workflow graph: one step forward, or a return edge.
    pub fn can_transition_to(self, to: Stage) -> bool {
        self.next() == Some(to) || self.return_target() == Some(to)
    }

    /// The role that works cases at this stage. `Approved` has none.
    pub fn acting_role(self) -> Option<Role> {
        match self {
            Stage::Triage => Some(Role::Triage),
            Stage::DataEntry => Some(Role::DataEntry),
            Stage::MedicalReview => Some(Role::Medical),
            Stage::QualityReview => Some(Role::Quality),
            Stage::Approved => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Approved
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.working_label(), self.step())
    }
}

impl Serialize for Stage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Stage", 2)?;
        state.serialize_field("currentStep", &self.step())?;
        state.serialize_field("status", self.status_label())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct StageFields {
            #[serde(rename = "currentStep", default)]
            current_step: Option<u8>,
            #[serde(default)]
            status: Option<String>,
        }

        let fields = StageFields::deserialize(deserializer)?;
        let from_step = match fields.current_step {
            Some(step) => Some(
                Stage::from_step(step)
                    .ok_or_else(|| de::Error::custom(format!("unknown currentStep {step}")))?,
            ),
            None => None,
        };
        let from_status = match fields.status.as_deref() {
            Some(label) => Some(
                Stage::parse(label)
                    .ok_or_else(|| de::Error::custom(format!("unknown status '{label}'")))?,
            ),
            None => None,
        };

        match (from_step, from_status) {
            (Some(a), Some(b)) if a != b => Err(de::Error::custom(format!(
                "currentStep {} disagrees with status '{}'",
                a.step(),
                b.status_label()
            ))),
            (Some(stage), _) | (None, Some(stage)) => Ok(stage),
            (None, None) => Err(de::Error::custom("missing currentStep and status")),
        }
    }
}

/// Serialises a [`Stage`] as its status label alone (for audit entries and counters).
pub mod stage_label {
    use super::Stage;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(stage: &Stage, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(stage.status_label())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Stage, D::Error>
    where
        D: Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Stage::parse(&label).ok_or_else(|| de::Error::custom(format!("unknown stage '{label}'")))
    }
}

/// Workflow roles. `Admin` acts on no stage and may only reset or delete training cases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Triage,
    DataEntry,
    Medical,
    Quality,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Triage,
        Role::DataEntry,
        Role::Medical,
        Role::Quality,
        Role::Admin,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Role::Triage => "Triage",
            Role::DataEntry => "Data Entry",
            Role::Medical => "Medical",
            Role::Quality => "Quality",
            Role::Admin => "Admin",
        }
    }

    /// Parses a role name, tolerating case, spaces, hyphens and underscores
    /// (`"Data Entry"`, `"data_entry"`, `"dataentry"`), plus the `*_review` and `qc` spellings.
    pub fn parse(input: &str) -> Option<Self> {
        let key: String = input
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "triage" => Some(Role::Triage),
            "dataentry" => Some(Role::DataEntry),
            "medical" | "medicalreview" => Some(Role::Medical),
            "quality" | "qualityreview" | "qc" => Some(Role::Quality),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// The stage this role acts on.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Role::Triage => Some(Stage::Triage),
            Role::DataEntry => Some(Stage::DataEntry),
            Role::Medical => Some(Stage::MedicalReview),
            Role::Quality => Some(Stage::QualityReview),
            Role::Admin => None,
        }
    }

    pub fn step(self) -> Option<u8> {
        self.stage().map(Stage::step)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Role {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Role::parse(&raw).ok_or_else(|| de::Error::custom(format!("unknown role '{raw}'")))
    }
}
