//! MedDRA coding assist.
//!
//! This crate supplies the two pure functions the medical review stage consumes:
//! - term lookup over a MedDRA dictionary (LLT → PT → HLT → SOC rows)
//! - Important Medical Event (IME) membership for a preferred term
//!
//! Dictionary content is deliberately small: the built-in set is a training sample, and a
//! full licensed extract can be supplied as YAML at process start. Both the dictionary and
//! the IME list are immutable once built.

pub mod dictionary;
pub mod ime;

pub use dictionary::{MeddraDictionary, TermEntry};
pub use ime::ImeList;

/// Default cap on the number of rows returned by a lookup.
pub const DEFAULT_LOOKUP_LIMIT: usize = 20;

/// Errors returned by the `pv-meddra` crate.
#[derive(Debug, thiserror::Error)]
pub enum MeddraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema mismatch at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("invalid MedDRA code '{0}' (expected 8 digits)")]
    InvalidCode(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Type alias for Results that can fail with a [`MeddraError`].
pub type MeddraResult<T> = Result<T, MeddraError>;

/// Terminology capabilities consumed by the case workflow.
///
/// Implementations must be pure: the same query always yields the same rows and no call has
/// side effects.
pub trait Terminology: Send + Sync {
    /// Returns dictionary rows matching `query`, best matches first.
    fn lookup(&self, query: &str) -> Vec<TermEntry>;

    /// Returns the dictionary row for the preferred term with code `pt_code`, if any.
    fn preferred_term(&self, pt_code: &str) -> Option<TermEntry>;

    /// Returns true if `pt` is on the Important Medical Event list.
    fn is_ime(&self, pt: &str) -> bool;
}

/// Dictionary plus IME list, bundled as the coding assist handed to the workflow engine.
#[derive(Clone, Debug)]
pub struct CodingAssist {
    dictionary: MeddraDictionary,
    ime: ImeList,
    limit: usize,
}

impl CodingAssist {
    /// Bundles a dictionary and an IME list with the default lookup cap.
    ///
    /// # Arguments
    ///
    /// * `dictionary` - Terms offered by lookups and used to resolve PT codes.
    /// * `ime` - Preferred terms that raise the Important Medical Event flag.
    pub fn new(dictionary: MeddraDictionary, ime: ImeList) -> Self {
        Self {
            dictionary,
            ime,
            limit: DEFAULT_LOOKUP_LIMIT,
        }
    }

    /// Overrides the maximum number of rows a lookup returns.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Lookup with an explicit row cap (still bounded by the configured limit).
    pub fn lookup_limited(&self, query: &str, limit: usize) -> Vec<TermEntry> {
        self.dictionary.search(query, limit.min(self.limit))
    }
}

impl Default for CodingAssist {
    fn default() -> Self {
        Self::new(MeddraDictionary::builtin(), ImeList::builtin())
    }
}

impl Terminology for CodingAssist {
    fn lookup(&self, query: &str) -> Vec<TermEntry> {
        self.dictionary.search(query, self.limit)
    }

    fn preferred_term(&self, pt_code: &str) -> Option<TermEntry> {
        self.dictionary.find_pt(pt_code).cloned()
    }

    fn is_ime(&self, pt: &str) -> bool {
        self.ime.contains(pt)
    }
}

/// Parse YAML into `T`, reporting the failing field path on mismatch.
pub(crate) fn parse_yaml<T>(yaml_text: &str) -> MeddraResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    serde_path_to_error::deserialize::<_, T>(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        MeddraError::Schema {
            path,
            message: err.into_inner().to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_assist_codes_nausea_and_flags_anaphylaxis() {
        let assist = CodingAssist::default();

        let rows = assist.lookup("nausea");
        assert_eq!(rows[0].pt, "Nausea");
        assert_eq!(rows[0].pt_code, "10028813");

        assert!(assist.is_ime("Anaphylactic reaction"));
        assert!(!assist.is_ime("Nausea"));
    }

    #[test]
    fn preferred_term_resolves_pt_codes() {
        let assist = CodingAssist::default();
        let row = assist.preferred_term("10002198").unwrap();
        assert_eq!(row.pt, "Anaphylactic reaction");
        assert!(assist.preferred_term("99999999").is_none());
    }

    #[test]
    fn limit_caps_lookup_results() {
        let assist = CodingAssist::default().with_limit(2);
        assert!(assist.lookup("a").len() <= 2);
        assert_eq!(assist.lookup_limited("a", 1).len(), 1);
    }
}
