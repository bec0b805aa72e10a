use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{error::AppError, services::feed_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sessions/{id}/feed",
    tag = "feed",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Change events named `<collection>.<kind>`", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session")
    )
)]
/// Stream the changes of one session.
pub async fn session_feed(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let receiver = feed_service::subscribe(&state, id).await?;
    info!(session_id = %id, "feed stream connected");
    Ok(feed_service::to_sse_stream(receiver, id))
}

/// Configure the change feed endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/feed", get(session_feed))
}
