use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::session_service::load_session,
    state::{SharedState, feed::ChangeEvent},
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const FORWARD_BUFFER: usize = 16;

/// Subscribe to the changes of one session. Fails when the session does not exist.
pub async fn subscribe(
    state: &SharedState,
    session_id: Uuid,
) -> Result<broadcast::Receiver<ChangeEvent>, ServiceError> {
    let store = state.require_session_store().await?;
    // Subscribe first so nothing published after the existence check is missed.
    let receiver = state.feed().subscribe();
    load_session(&store, session_id).await?;
    Ok(receiver)
}

/// Render a change as an SSE event named `<collection>.<kind>` with a JSON body.
pub fn to_event(change: &ChangeEvent) -> Option<Event> {
    match serde_json::to_string(change) {
        Ok(data) => Some(Event::default().event(change.name()).data(data)),
        Err(err) => {
            warn!(error = %err, "failed to encode change event");
            None
        }
    }
}

/// Forward the changes of `session_id` from the hub to an SSE response until the client leaves.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ChangeEvent>,
    session_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(FORWARD_BUFFER);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                received = receiver.recv() => match received {
                    Ok(change) if change.session_id == session_id => {
                        let Some(event) = to_event(&change) else { continue };
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(session_id = %session_id, skipped, "feed subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!(session_id = %session_id, "feed stream disconnected");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{metadata::PlaceholderMetadata, session_store::memory::MemorySessionStore},
        services::session_service::create_session,
        state::{AppState, feed::Collection},
    };

    #[tokio::test]
    async fn unknown_session_cannot_be_followed() {
        let state = AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        assert!(matches!(
            subscribe(&state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn hub_carries_session_creation() {
        let state = AppState::new(AppConfig::default(), Arc::new(PlaceholderMetadata));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let mut receiver = state.feed().subscribe();

        let id = create_session(&state, "owner".into(), Vec::new())
            .await
            .unwrap()
            .session
            .id;
        let change = receiver.recv().await.unwrap();
        assert_eq!(change.collection, Collection::Sessions);
        assert_eq!(change.session_id, id);
        assert!(to_event(&change).is_some());
    }
}
