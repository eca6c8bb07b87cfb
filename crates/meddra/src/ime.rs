//! Important Medical Event list.

use crate::{parse_yaml, MeddraResult};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Preferred terms treated as Important Medical Events out of the box.
const BUILTIN_IME_TERMS: &[&str] = &[
    "Acute kidney injury",
    "Agranulocytosis",
    "Anaphylactic reaction",
    "Aplastic anaemia",
    "Drug-induced liver injury",
    "Hepatic failure",
    "Myocardial infarction",
    "Pancreatitis acute",
    "Seizure",
    "Stevens-Johnson syndrome",
    "Torsade de pointes",
    "Toxic epidermal necrolysis",
];

/// Fixed, case-insensitive set of IME preferred terms.
#[derive(Clone, Debug, Default)]
pub struct ImeList {
    // Lower-cased for membership tests.
    terms: BTreeSet<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ImeWire {
    preferred_terms: Vec<String>,
}

impl ImeList {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_IME_TERMS)
    }

    /// Parses `preferred_terms: [...]` YAML.
    pub fn from_yaml(yaml_text: &str) -> MeddraResult<Self> {
        let wire: ImeWire = parse_yaml(yaml_text)?;
        Ok(Self::new(wire.preferred_terms))
    }

    pub fn load(path: &Path) -> MeddraResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn contains(&self, pt: &str) -> bool {
        self.terms.contains(&pt.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_ignores_case_and_surrounding_space() {
        let ime = ImeList::builtin();
        assert!(ime.contains("stevens-johnson syndrome"));
        assert!(ime.contains("  Hepatic failure "));
        assert!(!ime.contains("Headache"));
    }

    #[test]
    fn from_yaml_replaces_builtin_list() {
        let ime = ImeList::from_yaml("preferred_terms:\n  - Headache\n  - ''\n").unwrap();
        assert_eq!(ime.len(), 1);
        assert!(ime.contains("headache"));
        assert!(!ime.contains("Seizure"));
    }

    #[test]
    fn from_yaml_rejects_unknown_keys() {
        assert!(ImeList::from_yaml("terms: [Seizure]\n").is_err());
    }
}
