//! Acting-identity resolution.
//!
//! Callers name themselves with a user name and, optionally, the role they believe they hold.
//! The user name is resolved through the configured [`IdentityProvider`]; a claimed role that
//! disagrees with the resolved one is rejected rather than trusted.

use pv_core::{Actor, IdentityProvider, Role};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no acting user given")]
    MissingUser,
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    #[error("user '{user}' holds the {actual} role, not {claimed}")]
    RoleMismatch {
        user: String,
        claimed: Role,
        actual: Role,
    },
}

/// Resolves `user` (and an optional claimed `role`) to an [`Actor`].
///
/// # Arguments
///
/// * `identity` - Account directory to resolve against.
/// * `user` - Acting user name; blank counts as missing.
/// * `role` - Role the caller claims, checked against the account's role when present.
///
/// # Errors
///
/// Returns an [`AuthError`] naming the first check that failed.
pub fn resolve_actor(
    identity: &dyn IdentityProvider,
    user: Option<&str>,
    role: Option<&str>,
) -> Result<Actor, AuthError> {
    let user = user
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(AuthError::MissingUser)?;
    let actor = identity
        .actor(user)
        .ok_or_else(|| AuthError::UnknownUser(user.to_string()))?;

    if let Some(raw) = role.map(str::trim).filter(|r| !r.is_empty()) {
        let claimed = Role::parse(raw).ok_or_else(|| AuthError::UnknownRole(raw.to_string()))?;
        if claimed != actor.role {
            tracing::warn!("role claim {} rejected for {}", claimed, user);
            return Err(AuthError::RoleMismatch {
                user: user.to_string(),
                claimed,
                actual: actor.role,
            });
        }
    }
    Ok(actor)
}
