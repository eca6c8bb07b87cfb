//! Constants used throughout the PV core crate.
//!
//! Path names, defaults and validation limits live here so that the store, the workflow engine
//! and the binaries agree on them.

/// Directory name for case documents under the data directory.
pub const CASES_DIR_NAME: &str = "cases";

/// Filename of the YAML case document inside each sharded case directory.
pub const CASE_FILE_NAME: &str = "case.yaml";

/// Suffix for the temporary file written before an atomic rename.
pub const CASE_TMP_SUFFIX: &str = "yaml.tmp";

/// Default timeout for a single store call made from an async request handler.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Default listen address for the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Default E2B batch sender identifier.
pub const DEFAULT_E2B_SENDER: &str = "SKYVIG";

/// Default E2B batch receiver identifier.
pub const DEFAULT_E2B_RECEIVER: &str = "EVHUMAN";

/// MedDRA version stamped on coded reactions in exports.
pub const DEFAULT_MEDDRA_VERSION: &str = "27.0";

/// Maximum number of characters accepted for patient initials.
pub const MAX_PATIENT_INITIALS_CHARS: usize = 10;

/// Upper bound (inclusive) for patient age in years.
pub const MAX_PATIENT_AGE: u8 = 150;

/// Attempts at drawing a fresh case id when the derived case number is already taken.
pub const CASE_NUMBER_ATTEMPTS: usize = 8;
