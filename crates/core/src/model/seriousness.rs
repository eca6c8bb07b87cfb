//! Seriousness criteria ticked on the data entry form.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeriousnessCriterion {
    Death,
    LifeThreatening,
    Hospitalization,
    Disability,
    CongenitalAnomaly,
    OtherSerious,
}

impl SeriousnessCriterion {
    pub const ALL: [SeriousnessCriterion; 6] = [
        SeriousnessCriterion::Death,
        SeriousnessCriterion::LifeThreatening,
        SeriousnessCriterion::Hospitalization,
        SeriousnessCriterion::Disability,
        SeriousnessCriterion::CongenitalAnomaly,
        SeriousnessCriterion::OtherSerious,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SeriousnessCriterion::Death => "Death",
            SeriousnessCriterion::LifeThreatening => "Life-threatening",
            SeriousnessCriterion::Hospitalization => "Hospitalization",
            SeriousnessCriterion::Disability => "Disability",
            SeriousnessCriterion::CongenitalAnomaly => "Congenital anomaly",
            SeriousnessCriterion::OtherSerious => "Other serious",
        }
    }

    /// Parses a form label. Case, spacing and hyphenation are ignored, and the E2B wording
    /// ("Hospitalisation", "Other medically important") is accepted too.
    pub fn parse(input: &str) -> Option<Self> {
        let key: String = input
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "death" | "resultsindeath" => Some(SeriousnessCriterion::Death),
            "lifethreatening" => Some(SeriousnessCriterion::LifeThreatening),
            "hospitalization" | "hospitalisation" => Some(SeriousnessCriterion::Hospitalization),
            "disability" => Some(SeriousnessCriterion::Disability),
            "congenitalanomaly" => Some(SeriousnessCriterion::CongenitalAnomaly),
            "otherserious" | "othermedicallyimportant" => Some(SeriousnessCriterion::OtherSerious),
            _ => None,
        }
    }

    pub(crate) fn e2b_code(self) -> pv_e2b::SeriousnessCode {
        use pv_e2b::SeriousnessCode as Code;
        match self {
            SeriousnessCriterion::Death => Code::ResultsInDeath,
            SeriousnessCriterion::LifeThreatening => Code::LifeThreatening,
            SeriousnessCriterion::Hospitalization => Code::Hospitalisation,
            SeriousnessCriterion::Disability => Code::Disability,
            SeriousnessCriterion::CongenitalAnomaly => Code::CongenitalAnomaly,
            SeriousnessCriterion::OtherSerious => Code::OtherMedicallyImportant,
        }
    }
}

impl fmt::Display for SeriousnessCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for SeriousnessCriterion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for SeriousnessCriterion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        SeriousnessCriterion::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("unknown seriousness criterion '{raw}'")))
    }
}

/// A duplicate-free set of criteria that keeps the order they were ticked in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeriousnessCriteria(Vec<SeriousnessCriterion>);

impl SeriousnessCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a list, rejecting repeats.
    pub fn from_list(items: Vec<SeriousnessCriterion>) -> Result<Self, SeriousnessCriterion> {
        let mut set = Self::new();
        for item in items {
            if set.contains(item) {
                return Err(item);
            }
            set.0.push(item);
        }
        Ok(set)
    }

    /// Absent becomes present, present becomes absent. Returns whether it is now present.
    pub fn toggle(&mut self, criterion: SeriousnessCriterion) -> bool {
        if let Some(pos) = self.0.iter().position(|c| *c == criterion) {
            self.0.remove(pos);
            false
        } else {
            self.0.push(criterion);
            true
        }
    }

    pub fn contains(&self, criterion: SeriousnessCriterion) -> bool {
        self.0.contains(&criterion)
    }

    pub fn iter(&self) -> impl Iterator<Item = SeriousnessCriterion> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SeriousnessCriteria {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SeriousnessCriteria {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<SeriousnessCriterion>::deserialize(deserializer)?;
        SeriousnessCriteria::from_list(items).map_err(|dup| {
            de::Error::custom(format!("duplicate seriousness criterion '{dup}'"))
        })
    }
}
