//! Implementation of the case identifier types.

use crate::{IdError, IdResult};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Prefix of every human-facing case number.
const CASE_NUMBER_PREFIX: &str = "PV";

/// Number of hex characters in the random case-number suffix.
const CASE_NUMBER_SUFFIX_LEN: usize = 6;

/// Canonical case storage identifier (32 lowercase hex characters, no hyphens).
///
/// Once constructed, the contained UUID is guaranteed to be in canonical form, so path
/// derivation is deterministic.
///
/// # Construction
/// - [`CaseId::new`] generates a fresh identifier for a new case.
/// - [`CaseId::parse`] validates an externally supplied identifier. Hyphenated or
///   upper-case forms are rejected rather than normalised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseId(Uuid);

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseId {
    /// Generates a new random (v4) case identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an identifier that must already be in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidInput`] if `input` is not 32 lowercase hex characters.
    pub fn parse(input: &str) -> IdResult<Self> {
        if !Self::is_canonical(input) {
            return Err(IdError::InvalidInput(format!(
                "case id must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| IdError::InvalidInput(format!("invalid case id '{}': {}", input, e)))
    }

    /// Returns the UUID as a `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is in canonical form.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns `parent_dir/<s1>/<s2>/<id>/` where `s1`/`s2` are the first four hex characters.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.0.simple().to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for CaseId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaseId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CaseId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CaseId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CaseId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Human-facing case number, e.g. `PV-20261018-3FA9C2`.
///
/// The date component is the day the case was received; the suffix is the first six hex
/// characters of the case's [`CaseId`]. Two ids can share that prefix, so the number alone is
/// not unique: case stores refuse a second case with the same number and the workflow engine
/// retries with a fresh id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseNumber(String);

impl CaseNumber {
    /// Derives a case number from the received date and the case identifier.
    ///
    /// # Arguments
    ///
    /// * `received` - Day the report was received.
    /// * `id` - Identifier whose leading hex characters form the suffix.
    ///
    /// # Returns
    ///
    /// A number such as `PV-20261018-3FA9C2`.
    pub fn generate(received: NaiveDate, id: &CaseId) -> Self {
        let hex = id.uuid().simple().to_string().to_ascii_uppercase();
        Self(format!(
            "{}-{}-{}",
            CASE_NUMBER_PREFIX,
            received.format("%Y%m%d"),
            &hex[..CASE_NUMBER_SUFFIX_LEN]
        ))
    }

    /// Validates an externally supplied case number.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidInput`] unless the input is `PV-`, a valid `YYYYMMDD` date,
    /// `-` and six upper-case hex characters.
    pub fn parse(input: &str) -> IdResult<Self> {
        let invalid = || {
            IdError::InvalidInput(format!(
                "case number must look like PV-YYYYMMDD-XXXXXX, got: '{}'",
                input
            ))
        };

        let mut parts = input.split('-');
        let (Some(prefix), Some(date), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if prefix != CASE_NUMBER_PREFIX {
            return Err(invalid());
        }
        if date.len() != 8 || NaiveDate::parse_from_str(date, "%Y%m%d").is_err() {
            return Err(invalid());
        }
        let suffix_ok = suffix.len() == CASE_NUMBER_SUFFIX_LEN
            && suffix
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F'));
        if !suffix_ok {
            return Err(invalid());
        }

        Ok(Self(input.to_owned()))
    }

    /// Returns the case number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CaseNumber {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaseNumber::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CaseNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CaseNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CaseNumber::parse(&s).map_err(serde::de::Error::custom)
    }
}
