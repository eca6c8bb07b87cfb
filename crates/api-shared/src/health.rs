use crate::dto::HealthRes;

/// Simple health service shared by the REST server and the CLI.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    /// Check health without creating an instance.
    ///
    /// # Returns
    ///
    /// A [`HealthRes`] with `ok: true` and a fixed liveness message.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "SkyVigilance PV is alive".into(),
        }
    }
}
