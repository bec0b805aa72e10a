use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod feed;
pub mod health;
pub mod rounds;
pub mod sessions;

/// Compose every route tree and attach the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sessions::router())
        .merge(rounds::router())
        .merge(feed::router())
        .merge(docs::router())
        .with_state(state)
}
