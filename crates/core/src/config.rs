//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Nothing in the core reads environment variables during request
//! handling; binaries read them once and build a [`CoreConfig`].

use crate::constants::{
    DEFAULT_E2B_RECEIVER, DEFAULT_E2B_SENDER, DEFAULT_MEDDRA_VERSION, DEFAULT_STORE_TIMEOUT_MS,
};
use crate::{CaseError, CaseResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: Option<PathBuf>,
    e2b_sender: String,
    e2b_receiver: String,
    meddra_version: String,
    store_timeout: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `data_dir` selects the file store; `None` means cases live in memory only.
    pub fn new(
        data_dir: Option<PathBuf>,
        e2b_sender: String,
        e2b_receiver: String,
        store_timeout: Duration,
    ) -> CaseResult<Self> {
        let e2b_sender = e2b_sender.trim().to_string();
        let e2b_receiver = e2b_receiver.trim().to_string();
        if e2b_sender.is_empty() || e2b_receiver.is_empty() {
            return Err(CaseError::InvalidInput(
                "E2B sender and receiver identifiers cannot be empty".into(),
            ));
        }
        if store_timeout.is_zero() {
            return Err(CaseError::InvalidInput(
                "store timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            data_dir,
            e2b_sender,
            e2b_receiver,
            meddra_version: DEFAULT_MEDDRA_VERSION.to_string(),
            store_timeout,
        })
    }

    /// Overrides the MedDRA version stamped on exported reactions.
    pub fn with_meddra_version(mut self, version: impl Into<String>) -> Self {
        self.meddra_version = version.into();
        self
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn e2b_sender(&self) -> &str {
        &self.e2b_sender
    }

    pub fn e2b_receiver(&self) -> &str {
        &self.e2b_receiver
    }

    pub fn meddra_version(&self) -> &str {
        &self.meddra_version
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            e2b_sender: DEFAULT_E2B_SENDER.to_string(),
            e2b_receiver: DEFAULT_E2B_RECEIVER.to_string(),
            meddra_version: DEFAULT_MEDDRA_VERSION.to_string(),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

/// Parse the store timeout from an optional environment value in milliseconds.
///
/// If `value` is `None` or empty/whitespace, returns the default.
pub fn store_timeout_from_env_value(value: Option<String>) -> CaseResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    match value {
        None => Ok(Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS)),
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| {
                CaseError::InvalidInput(format!(
                    "PV_STORE_TIMEOUT_MS must be a positive number of milliseconds, got '{raw}'"
                ))
            }),
    }
}

/// Returns `value` trimmed, or `default` when it is absent or blank.
pub fn text_from_env_value(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Returns the path in `value`, or `None` when it is absent or blank.
pub fn path_from_env_value(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_timeout_defaults_and_parses() {
        assert_eq!(
            store_timeout_from_env_value(None).unwrap(),
            Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS)
        );
        assert_eq!(
            store_timeout_from_env_value(Some(" 250 ".into())).unwrap(),
            Duration::from_millis(250)
        );
        assert!(store_timeout_from_env_value(Some("0".into())).is_err());
        assert!(store_timeout_from_env_value(Some("soon".into())).is_err());
    }

    #[test]
    fn new_rejects_blank_e2b_identifiers() {
        let err = CoreConfig::new(None, " ".into(), "EVHUMAN".into(), Duration::from_secs(1));
        assert!(matches!(err, Err(CaseError::InvalidInput(_))));
    }

    #[test]
    fn blank_env_values_fall_back() {
        assert_eq!(text_from_env_value(Some("  ".into()), "SKYVIG"), "SKYVIG");
        assert_eq!(path_from_env_value(Some("".into())), None);
        assert_eq!(
            path_from_env_value(Some("/tmp/pv".into())),
            Some(PathBuf::from("/tmp/pv"))
        );
    }
}
