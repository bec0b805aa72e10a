use serde::Serialize;
use utoipa::ToSchema;

/// Payload of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` while no session store is reachable.
    pub status: &'static str,
}

impl HealthResponse {
    /// Store reachable.
    pub fn ok() -> Self {
        Self { status: "ok" }
    }

    /// Running without storage.
    pub fn degraded() -> Self {
        Self { status: "degraded" }
    }
}
