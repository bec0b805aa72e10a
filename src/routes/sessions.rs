use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        CreateSessionRequest, PopulatePoolRequest, PoolResponse, SessionDetailsResponse,
        SessionSummary, TitleCardDto,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Session lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/users/{user_id}/sessions", get(list_sessions))
        .route("/sessions/{id}/items", post(populate_pool))
        .route("/sessions/{id}/deck/{user_id}", get(deck))
        .route("/sessions/{id}/winner", get(winner))
}

/// Create a session in the invite round.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionDetailsResponse),
        (status = 400, description = "Invalid participant ids")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionDetailsResponse>), AppError> {
    let details =
        session_service::create_session(&state, payload.owner_id, payload.guest_ids).await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// Session with pool and participant progress.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session found", body = SessionDetailsResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetailsResponse>, AppError> {
    let details = session_service::get_session(&state, id).await?;
    Ok(Json(details.into()))
}

/// Sessions the user owns or was invited to, newest first.
#[utoipa::path(
    get,
    path = "/users/{user_id}/sessions",
    tag = "sessions",
    params(("user_id" = String, Path, description = "Participant identifier")),
    responses((status = 200, description = "Sessions of the user", body = [SessionSummary]))
)]
pub async fn list_sessions(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    let sessions = session_service::list_sessions(&state, &user_id).await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

/// Fill the candidate pool. Owner only, once, during the invite round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/items",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = PopulatePoolRequest,
    responses(
        (status = 201, description = "Pool filled", body = PoolResponse),
        (status = 403, description = "Caller is not the owner"),
        (status = 409, description = "Pool already filled or round over")
    )
)]
pub async fn populate_pool(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<PopulatePoolRequest>>,
) -> Result<(StatusCode, Json<PoolResponse>), AppError> {
    let outcome =
        session_service::populate_pool(&state, id, &payload.user_id, payload.catalog_ids).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Titles the user has not swiped yet.
#[utoipa::path(
    get,
    path = "/sessions/{id}/deck/{user_id}",
    tag = "rounds",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("user_id" = String, Path, description = "Participant identifier")
    ),
    responses((status = 200, description = "Remaining titles", body = [TitleCardDto]))
)]
pub async fn deck(
    State(state): State<SharedState>,
    Path((id, user_id)): Path<(Uuid, String)>,
) -> Result<Json<Vec<TitleCardDto>>, AppError> {
    let cards = session_service::deck(&state, id, &user_id).await?;
    Ok(Json(cards.into_iter().map(Into::into).collect()))
}

/// Winning title of a complete session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/winner",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Winner", body = TitleCardDto),
        (status = 409, description = "No winner yet")
    )
)]
pub async fn winner(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TitleCardDto>, AppError> {
    let card = session_service::winner(&state, id).await?;
    Ok(Json(card.into()))
}
