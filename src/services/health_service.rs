use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the installed store and report whether the service runs degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store_reachable = match state.session_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "session store health check failed");
                false
            }
        },
        None => {
            warn!("no session store installed (degraded mode)");
            false
        }
    };

    if store_reachable && !state.is_degraded().await {
        HealthResponse::ok()
    } else {
        HealthResponse::degraded()
    }
}
