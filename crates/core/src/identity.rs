//! Who is acting.
//!
//! Identity is an injected capability: the workflow engine only ever sees an [`Actor`]. The
//! training build ships [`StaticAccounts`], a fixed allow-list of demo users, optionally
//! replaced at startup from a YAML file:
//!
//! ```yaml
//! accounts:
//!   - username: triage1
//!     password: train123
//!     role: Triage
//! ```

use crate::error::{CaseError, CaseResult};
use crate::model::{Actor, Role};
use crate::parse_yaml;
use pv_types::NonEmptyText;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub trait IdentityProvider: Send + Sync {
    /// Checks credentials and returns the acting user on success.
    fn authenticate(&self, username: &str, password: &str) -> Option<Actor>;

    /// Looks up the role of a known user.
    fn resolve_role(&self, username: &str) -> Option<Role>;

    /// Resolves a user name into an actor without checking credentials.
    fn actor(&self, username: &str) -> Option<Actor> {
        let role = self.resolve_role(username)?;
        let username = NonEmptyText::new(username).ok()?;
        Some(Actor::new(username, role))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AccountsFile {
    accounts: Vec<Account>,
}

/// Fixed set of accounts, keyed by user name.
#[derive(Clone, Debug)]
pub struct StaticAccounts {
    accounts: BTreeMap<String, Account>,
}

impl StaticAccounts {
    /// Builds the allow-list. User names are trimmed and must be unique and non-empty.
    pub fn new(accounts: Vec<Account>) -> CaseResult<Self> {
        let mut map = BTreeMap::new();
        for mut account in accounts {
            account.username = account.username.trim().to_string();
            if account.username.is_empty() {
                return Err(CaseError::InvalidInput("account username cannot be empty".into()));
            }
            if account.password.is_empty() {
                return Err(CaseError::InvalidInput(format!(
                    "account '{}' has an empty password",
                    account.username
                )));
            }
            let name = account.username.clone();
            if map.insert(name.clone(), account).is_some() {
                return Err(CaseError::InvalidInput(format!(
                    "duplicate account '{name}'"
                )));
            }
        }
        Ok(Self { accounts: map })
    }

    /// The demo users from the training frontend, plus an administrator for resets.
    pub fn training() -> Self {
        let demo = [
            ("triage1", Role::Triage),
            ("dataentry1", Role::DataEntry),
            ("medical1", Role::Medical),
            ("quality1", Role::Quality),
            ("admin", Role::Admin),
        ];
        let accounts = demo
            .into_iter()
            .map(|(username, role)| {
                (
                    username.to_string(),
                    Account {
                        username: username.to_string(),
                        password: "train123".to_string(),
                        role,
                    },
                )
            })
            .collect();
        Self { accounts }
    }

    pub fn from_yaml(yaml_text: &str) -> CaseResult<Self> {
        let file: AccountsFile = parse_yaml(yaml_text)
            .map_err(|message| CaseError::InvalidInput(format!("accounts file: {message}")))?;
        Self::new(file.accounts)
    }

    pub fn load(path: &Path) -> CaseResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CaseError::InvalidInput(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl Default for StaticAccounts {
    fn default() -> Self {
        Self::training()
    }
}

impl IdentityProvider for StaticAccounts {
    fn authenticate(&self, username: &str, password: &str) -> Option<Actor> {
        let account = self.accounts.get(username.trim())?;
        if account.password != password {
            return None;
        }
        let username = NonEmptyText::new(&account.username).ok()?;
        Some(Actor::new(username, account.role))
    }

    fn resolve_role(&self, username: &str) -> Option<Role> {
        self.accounts.get(username.trim()).map(|a| a.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_accounts_authenticate() {
        let accounts = StaticAccounts::training();
        let actor = accounts.authenticate("medical1", "train123").unwrap();
        assert_eq!(actor.role, Role::Medical);
        assert_eq!(actor.username.as_str(), "medical1");

        assert!(accounts.authenticate("medical1", "wrong").is_none());
        assert!(accounts.authenticate("nobody", "train123").is_none());
    }

    #[test]
    fn resolve_role_and_actor() {
        let accounts = StaticAccounts::training();
        assert_eq!(accounts.resolve_role("dataentry1"), Some(Role::DataEntry));
        assert_eq!(accounts.resolve_role("ghost"), None);
        assert_eq!(accounts.actor("admin").unwrap().role, Role::Admin);
    }

    #[test]
    fn from_yaml_parses_roles_and_rejects_duplicates() {
        let yaml = "accounts:\n  - username: qc\n    password: pw\n    role: qc\n";
        let accounts = StaticAccounts::from_yaml(yaml).unwrap();
        assert_eq!(accounts.resolve_role("qc"), Some(Role::Quality));

        let dup = concat!(
            "accounts:\n",
            "  - {username: a, password: p, role: Triage}\n",
            "  - {username: a, password: q, role: Medical}\n",
        );
        assert!(matches!(
            StaticAccounts::from_yaml(dup),
            Err(CaseError::InvalidInput(_))
        ));
    }

    #[test]
    fn from_yaml_reports_unknown_role() {
        let yaml = "accounts:\n  - username: x\n    password: p\n    role: Pharmacist\n";
        let err = StaticAccounts::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Pharmacist"));
    }
}
