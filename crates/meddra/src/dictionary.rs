//! MedDRA dictionary rows and lookup.

use crate::{parse_yaml, MeddraError, MeddraResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One lowest-level-term row with its place in the MedDRA hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    pub llt: String,
    pub llt_code: String,
    pub pt: String,
    pub pt_code: String,
    pub hlt: String,
    pub soc: String,
}

/// Immutable in-memory MedDRA dictionary.
#[derive(Clone, Debug, Default)]
pub struct MeddraDictionary {
    terms: Vec<TermEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DictionaryWire {
    terms: Vec<TermEntry>,
}

/// Training sample: (llt, llt_code, pt, pt_code, hlt, soc).
const BUILTIN_TERMS: &[(&str, &str, &str, &str, &str, &str)] = &[
    (
        "Nausea",
        "10028813",
        "Nausea",
        "10028813",
        "Nausea and vomiting symptoms",
        "Gastrointestinal disorders",
    ),
    (
        "Feeling sick",
        "10016370",
        "Nausea",
        "10028813",
        "Nausea and vomiting symptoms",
        "Gastrointestinal disorders",
    ),
    (
        "Vomiting",
        "10047700",
        "Vomiting",
        "10047700",
        "Nausea and vomiting symptoms",
        "Gastrointestinal disorders",
    ),
    ("Headache", "10019211", "Headache", "10019211", "Headaches NEC", "Nervous system disorders"),
    (
        "Dizziness",
        "10013573",
        "Dizziness",
        "10013573",
        "Neurological signs and symptoms NEC",
        "Nervous system disorders",
    ),
    (
        "Seizure",
        "10039906",
        "Seizure",
        "10039906",
        "Seizures and seizure disorders NEC",
        "Nervous system disorders",
    ),
    (
        "Convulsion",
        "10010904",
        "Seizure",
        "10039906",
        "Seizures and seizure disorders NEC",
        "Nervous system disorders",
    ),
    (
        "Rash",
        "10037844",
        "Rash",
        "10037844",
        "Rashes, eruptions and exanthems NEC",
        "Skin and subcutaneous tissue disorders",
    ),
    (
        "Urticaria",
        "10046735",
        "Urticaria",
        "10046735",
        "Urticarias",
        "Skin and subcutaneous tissue disorders",
    ),
    (
        "Hives",
        "10020169",
        "Urticaria",
        "10046735",
        "Urticarias",
        "Skin and subcutaneous tissue disorders",
    ),
    (
        "Stevens-Johnson syndrome",
        "10042033",
        "Stevens-Johnson syndrome",
        "10042033",
        "Bullous conditions",
        "Skin and subcutaneous tissue disorders",
    ),
    (
        "Toxic epidermal necrolysis",
        "10044223",
        "Toxic epidermal necrolysis",
        "10044223",
        "Bullous conditions",
        "Skin and subcutaneous tissue disorders",
    ),
    (
        "Anaphylactic reaction",
        "10002198",
        "Anaphylactic reaction",
        "10002198",
        "Anaphylactic and anaphylactoid responses",
        "Immune system disorders",
    ),
    (
        "Anaphylaxis",
        "10002218",
        "Anaphylactic reaction",
        "10002198",
        "Anaphylactic and anaphylactoid responses",
        "Immune system disorders",
    ),
    (
        "Hepatic failure",
        "10019663",
        "Hepatic failure",
        "10019663",
        "Hepatic failure and associated disorders",
        "Hepatobiliary disorders",
    ),
    (
        "Liver failure",
        "10024678",
        "Hepatic failure",
        "10019663",
        "Hepatic failure and associated disorders",
        "Hepatobiliary disorders",
    ),
    (
        "Drug-induced liver injury",
        "10072268",
        "Drug-induced liver injury",
        "10072268",
        "Hepatocellular damage and hepatitis NEC",
        "Hepatobiliary disorders",
    ),
    (
        "Acute kidney injury",
        "10069339",
        "Acute kidney injury",
        "10069339",
        "Renal failure and impairment",
        "Renal and urinary disorders",
    ),
    (
        "Agranulocytosis",
        "10001507",
        "Agranulocytosis",
        "10001507",
        "Neutropenias",
        "Blood and lymphatic system disorders",
    ),
    (
        "Torsade de pointes",
        "10044066",
        "Torsade de pointes",
        "10044066",
        "Ventricular arrhythmias and cardiac arrest",
        "Cardiac disorders",
    ),
    (
        "Myocardial infarction",
        "10028596",
        "Myocardial infarction",
        "10028596",
        "Ischaemic coronary artery disorders",
        "Cardiac disorders",
    ),
    (
        "Fatigue",
        "10016256",
        "Fatigue",
        "10016256",
        "Asthenic conditions",
        "General disorders and administration site conditions",
    ),
    (
        "Pyrexia",
        "10037660",
        "Pyrexia",
        "10037660",
        "Febrile disorders",
        "General disorders and administration site conditions",
    ),
    (
        "Fever",
        "10016558",
        "Pyrexia",
        "10037660",
        "Febrile disorders",
        "General disorders and administration site conditions",
    ),
];

impl MeddraDictionary {
    /// Builds a dictionary from rows, validating every code.
    ///
    /// # Errors
    ///
    /// Returns [`MeddraError::InvalidCode`] if an LLT or PT code is not eight digits, or
    /// [`MeddraError::InvalidInput`] if a term name is blank.
    pub fn new(terms: Vec<TermEntry>) -> MeddraResult<Self> {
        for term in &terms {
            validate_code(&term.llt_code)?;
            validate_code(&term.pt_code)?;
            if term.llt.trim().is_empty() || term.pt.trim().is_empty() {
                return Err(MeddraError::InvalidInput(format!(
                    "blank term name in row with LLT code {}",
                    term.llt_code
                )));
            }
        }
        Ok(Self { terms })
    }

    /// The built-in training dictionary.
    pub fn builtin() -> Self {
        let terms = BUILTIN_TERMS
            .iter()
            .map(|(llt, llt_code, pt, pt_code, hlt, soc)| TermEntry {
                llt: (*llt).to_string(),
                llt_code: (*llt_code).to_string(),
                pt: (*pt).to_string(),
                pt_code: (*pt_code).to_string(),
                hlt: (*hlt).to_string(),
                soc: (*soc).to_string(),
            })
            .collect();
        Self { terms }
    }

    /// Parses a dictionary from YAML text of the form `terms: [ {llt, llt_code, ...}, ... ]`.
    pub fn from_yaml(yaml_text: &str) -> MeddraResult<Self> {
        let wire: DictionaryWire = parse_yaml(yaml_text)?;
        Self::new(wire.terms)
    }

    /// Reads and parses a YAML dictionary file.
    pub fn load(path: &Path) -> MeddraResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Finds the first row whose PT code equals `pt_code`.
    pub fn find_pt(&self, pt_code: &str) -> Option<&TermEntry> {
        self.terms.iter().find(|t| t.pt_code == pt_code)
    }

    /// Case-insensitive search over LLT and PT names.
    ///
    /// Rows are ordered exact match, then prefix match, then substring match; ties are broken
    /// alphabetically by LLT. A blank query matches nothing.
    pub fn search(&self, query: &str, limit: usize) -> Vec<TermEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(u8, &TermEntry)> = self
            .terms
            .iter()
            .filter_map(|term| match_rank(term, &needle).map(|rank| (rank, term)))
            .collect();

        scored.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.llt.cmp(&b.llt)));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, term)| term.clone())
            .collect()
    }
}

fn match_rank(term: &TermEntry, needle: &str) -> Option<u8> {
    [term.llt.to_lowercase(), term.pt.to_lowercase()]
        .iter()
        .filter_map(|name| {
            if name == needle {
                Some(0)
            } else if name.starts_with(needle) {
                Some(1)
            } else if name.contains(needle) {
                Some(2)
            } else {
                None
            }
        })
        .min()
}

fn validate_code(code: &str) -> MeddraResult<()> {
    if code.len() == 8 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(MeddraError::InvalidCode(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rows_have_valid_codes() {
        let dict = MeddraDictionary::builtin();
        assert!(MeddraDictionary::new(dict.terms.clone()).is_ok());
        assert!(!dict.is_empty());
    }

    #[test]
    fn search_orders_exact_then_prefix_then_substring() {
        let dict = MeddraDictionary::builtin();
        let rows = dict.search("Rash", 10);
        assert_eq!(rows[0].llt, "Rash");

        let rows = dict.search("hep", 10);
        assert!(rows.iter().all(|r| r.llt.to_lowercase().contains("hep")
            || r.pt.to_lowercase().contains("hep")));
        assert_eq!(rows[0].llt, "Hepatic failure");
    }

    #[test]
    fn search_matches_on_preferred_term_for_synonym_llts() {
        let dict = MeddraDictionary::builtin();
        let rows = dict.search("anaphylactic reaction", 10);
        let llts: Vec<&str> = rows.iter().map(|r| r.llt.as_str()).collect();
        assert!(llts.contains(&"Anaphylactic reaction"));
        assert!(llts.contains(&"Anaphylaxis"));
        assert!(rows.iter().all(|r| r.pt_code == "10002198"));
    }

    #[test]
    fn blank_query_returns_nothing() {
        let dict = MeddraDictionary::builtin();
        assert!(dict.search("   ", 10).is_empty());
        assert!(dict.search("nausea", 0).is_empty());
    }

    #[test]
    fn from_yaml_reports_path_of_bad_field() {
        let yaml = "terms:\n  - llt: Nausea\n    llt_code: 10028813\n    pt: Nausea\n";
        let err = MeddraDictionary::from_yaml(yaml).unwrap_err();
        match err {
            MeddraError::Schema { path, .. } => assert!(path.starts_with("terms"), "{path}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn from_yaml_rejects_bad_codes() {
        let yaml = r#"
terms:
  - llt: Nausea
    llt_code: "1002"
    pt: Nausea
    pt_code: "10028813"
    hlt: Nausea and vomiting symptoms
    soc: Gastrointestinal disorders
"#;
        assert!(matches!(
            MeddraDictionary::from_yaml(yaml),
            Err(MeddraError::InvalidCode(code)) if code == "1002"
        ));
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("meddra.yaml");
        std::fs::write(
            &path,
            r#"
terms:
  - llt: Insomnia
    llt_code: "10022437"
    pt: Insomnia
    pt_code: "10022437"
    hlt: Disturbances in initiating and maintaining sleep
    soc: Psychiatric disorders
"#,
        )
        .unwrap();
        let dict = MeddraDictionary::load(&path).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.find_pt("10022437").map(|t| t.pt.as_str()), Some("Insomnia"));
    }
}
