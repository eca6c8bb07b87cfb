//! Process start-up: read the environment once and assemble [`AppState`].
//!
//! # Environment Variables
//! - `PV_REST_ADDR`: server address (default: "0.0.0.0:3000")
//! - `PV_DATA_DIR`: file store root; cases are kept in memory when unset
//! - `PV_ACCOUNTS_FILE`: YAML training accounts (default: the built-in demo users)
//! - `PV_MEDDRA_FILE`, `PV_IME_FILE`: YAML dictionary and IME list overrides
//! - `PV_E2B_SENDER`, `PV_E2B_RECEIVER`: E2B batch identifiers
//! - `PV_MEDDRA_VERSION`: MedDRA version stamped on exported reactions
//! - `PV_STORE_TIMEOUT_MS`: per-request store timeout (default: 5000)

use crate::AppState;
use pv_core::config::{path_from_env_value, store_timeout_from_env_value, text_from_env_value};
use pv_core::constants::{
    DEFAULT_E2B_RECEIVER, DEFAULT_E2B_SENDER, DEFAULT_MEDDRA_VERSION, DEFAULT_REST_ADDR,
};
use pv_core::{CaseService, CaseStore, CoreConfig, FileCaseStore, MemoryCaseStore, StaticAccounts};
use pv_meddra::{CodingAssist, ImeList, MeddraDictionary};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the server needs from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub rest_addr: String,
    pub cfg: CoreConfig,
    pub accounts_file: Option<PathBuf>,
    pub meddra_file: Option<PathBuf>,
    pub ime_file: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let var = |name: &str| std::env::var(name).ok();

        let cfg = CoreConfig::new(
            path_from_env_value(var("PV_DATA_DIR")),
            text_from_env_value(var("PV_E2B_SENDER"), DEFAULT_E2B_SENDER),
            text_from_env_value(var("PV_E2B_RECEIVER"), DEFAULT_E2B_RECEIVER),
            store_timeout_from_env_value(var("PV_STORE_TIMEOUT_MS"))?,
        )?
        .with_meddra_version(text_from_env_value(
            var("PV_MEDDRA_VERSION"),
            DEFAULT_MEDDRA_VERSION,
        ));

        Ok(Self {
            rest_addr: text_from_env_value(var("PV_REST_ADDR"), DEFAULT_REST_ADDR),
            cfg,
            accounts_file: path_from_env_value(var("PV_ACCOUNTS_FILE")),
            meddra_file: path_from_env_value(var("PV_MEDDRA_FILE")),
            ime_file: path_from_env_value(var("PV_IME_FILE")),
        })
    }
}

/// Opens the store and loads accounts and terminology.
///
/// # Arguments
///
/// * `settings` - Configuration resolved by [`Settings::from_env`].
///
/// # Returns
///
/// The state every handler shares: a file store when a data directory is set, otherwise an
/// in-memory store.
///
/// # Errors
///
/// Fails if the store cannot be opened or an override file cannot be loaded.
pub fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let cfg = Arc::new(settings.cfg.clone());

    let store: Arc<dyn CaseStore> = match cfg.data_dir() {
        Some(dir) => {
            let store = FileCaseStore::open(dir)?;
            tracing::info!("-- Case store: {}", store.cases_dir().display());
            Arc::new(store)
        }
        None => {
            tracing::warn!("-- PV_DATA_DIR not set; cases are kept in memory only");
            Arc::new(MemoryCaseStore::new())
        }
    };

    let accounts = match &settings.accounts_file {
        Some(path) => StaticAccounts::load(path)?,
        None => StaticAccounts::training(),
    };
    tracing::info!("-- {} training accounts loaded", accounts.len());

    let dictionary = match &settings.meddra_file {
        Some(path) => MeddraDictionary::load(path)?,
        None => MeddraDictionary::builtin(),
    };
    let ime = match &settings.ime_file {
        Some(path) => ImeList::load(path)?,
        None => ImeList::builtin(),
    };
    tracing::info!("-- MedDRA dictionary: {} terms", dictionary.len());
    let coding = Arc::new(CodingAssist::new(dictionary, ime));

    let service = Arc::new(CaseService::new(cfg.clone(), store, coding.clone()));
    Ok(AppState {
        cfg,
        service,
        identity: Arc::new(accounts),
        coding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_state_persists_cases() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let settings = Settings {
            rest_addr: DEFAULT_REST_ADDR.into(),
            cfg: CoreConfig::new(
                Some(temp_dir.path().to_path_buf()),
                "SENDER".into(),
                "RECEIVER".into(),
                std::time::Duration::from_secs(1),
            )
            .unwrap(),
            accounts_file: None,
            meddra_file: None,
            ime_file: None,
        };

        let state = build_state(&settings).unwrap();
        let actor = state.identity.actor("triage1").unwrap();
        state.service.intake_case(&actor).unwrap();

        let reopened = build_state(&settings).unwrap();
        assert_eq!(reopened.service.list_cases().unwrap().len(), 1);
    }

    #[test]
    fn missing_accounts_file_fails_startup() {
        let settings = Settings {
            rest_addr: DEFAULT_REST_ADDR.into(),
            cfg: CoreConfig::default(),
            accounts_file: Some(PathBuf::from("/nonexistent/accounts.yaml")),
            meddra_file: None,
            ime_file: None,
        };
        assert!(build_state(&settings).is_err());
    }
}
