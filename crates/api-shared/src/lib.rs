//! # API Shared
//!
//! Shared utilities and definitions for the PV case-processing API.
//!
//! Contains:
//! - Wire types (`dto` module) with OpenAPI schemas
//! - Shared services like `HealthService`
//! - Acting-identity resolution (`auth` module)
//!
//! Used by `api-rest` and the CLI so both speak the same shapes.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{resolve_actor, AuthError};
pub use dto::*;
pub use health::HealthService;
