use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(15);
const HEALTH_INTERVAL: Duration = Duration::from_secs(5);
const RECONNECT_ATTEMPTS: u32 = 3;

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Keep a session store installed in `state`, toggling degraded mode while it is unreachable.
///
/// `connect` builds a fresh store; it is called again whenever an installed store
/// cannot be revived with [`SessionStore::try_reconnect`]. Never returns.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match connect().await {
            Ok(store) => {
                state.install_session_store(store.clone()).await;
                info!("session store connected");
                backoff = INITIAL_BACKOFF;

                watch(&state, store.as_ref()).await;

                warn!("session store lost; dropping it and connecting again");
                state.clear_session_store().await;
            }
            Err(err) => warn!(error = %err, "session store connection failed"),
        }
        sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

/// Poll the store until it fails and cannot be revived.
async fn watch(state: &SharedState, store: &dyn SessionStore) {
    loop {
        sleep(HEALTH_INTERVAL).await;
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("session store healthy again");
                    state.update_degraded(false).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "session store health check failed; entering degraded mode");
                state.update_degraded(true).await;
                if !revive(store).await {
                    return;
                }
                state.update_degraded(false).await;
            }
        }
    }
}

async fn revive(store: &dyn SessionStore) -> bool {
    let mut backoff = INITIAL_BACKOFF;
    for attempt in 1..=RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "session store reconnected");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "session store reconnect failed");
                sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        let mut backoff = INITIAL_BACKOFF;
        for _ in 0..10 {
            backoff = next_backoff(backoff);
        }
        assert_eq!(backoff, MAX_BACKOFF);
    }
}
