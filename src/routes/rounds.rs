use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::round::{
        AttackRequest, AttackResponse, BarrierResponse, ParticipantQuery, ParticipantRequest,
        RankGroupDto, RankPickRequest, RankPickResponse, RankResetResponse, SwipeRequest,
        SwipeResponse,
    },
    error::AppError,
    services::{attrition_service, barrier, rank_service, swipe_service},
    state::SharedState,
};

/// Round endpoints: invites, swipes, ranking, completion signals and attacks.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/invite/accept", post(accept_invite))
        .route("/sessions/{id}/swipes", post(swipe))
        .route("/sessions/{id}/groups", get(groups))
        .route("/sessions/{id}/rank/pick", post(rank_pick))
        .route("/sessions/{id}/rank/reset", post(rank_reset))
        .route("/sessions/{id}/done", post(done))
        .route("/sessions/{id}/attacks", post(attack))
}

/// Accept an invitation; the last acceptance opens the swipe round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/invite/accept",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ParticipantRequest,
    responses(
        (status = 200, description = "Invitation accepted", body = BarrierResponse),
        (status = 409, description = "Already accepted or invite round over")
    )
)]
pub async fn accept_invite(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ParticipantRequest>>,
) -> Result<Json<BarrierResponse>, AppError> {
    let outcome = barrier::accept_invite(&state, id, &payload.user_id).await?;
    Ok(Json(outcome.into()))
}

/// Swipe a title.
#[utoipa::path(
    post,
    path = "/sessions/{id}/swipes",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SwipeRequest,
    responses(
        (status = 200, description = "Swipe recorded", body = SwipeResponse),
        (status = 409, description = "Title already swiped"),
        (status = 422, description = "Power-up exhausted")
    )
)]
pub async fn swipe(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SwipeRequest>>,
) -> Result<Json<SwipeResponse>, AppError> {
    let outcome =
        swipe_service::swipe(&state, id, &payload.user_id, payload.item_id, payload.action)
            .await?;
    Ok(Json(outcome.into()))
}

/// Rank groups with the caller's progress.
#[utoipa::path(
    get,
    path = "/sessions/{id}/groups",
    tag = "rounds",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("user_id" = String, Query, description = "Participant identifier")
    ),
    responses((status = 200, description = "Rank groups", body = [RankGroupDto]))
)]
pub async fn groups(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Query(query)): Valid<Query<ParticipantQuery>>,
) -> Result<Json<Vec<RankGroupDto>>, AppError> {
    let views = rank_service::groups(&state, id, &query.user_id).await?;
    Ok(Json(views.into_iter().map(Into::into).collect()))
}

/// Give the next rank in a group; the fourth pick commits it.
#[utoipa::path(
    post,
    path = "/sessions/{id}/rank/pick",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = RankPickRequest,
    responses(
        (status = 200, description = "Pick recorded", body = RankPickResponse),
        (status = 409, description = "Group already committed")
    )
)]
pub async fn rank_pick(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<RankPickRequest>>,
) -> Result<Json<RankPickResponse>, AppError> {
    let outcome =
        rank_service::pick(&state, id, &payload.user_id, payload.group, payload.item_id).await?;
    Ok(Json(outcome.into()))
}

/// Clear the in-progress ranks of the current group.
#[utoipa::path(
    post,
    path = "/sessions/{id}/rank/reset",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ParticipantRequest,
    responses((status = 200, description = "Picks cleared", body = RankResetResponse))
)]
pub async fn rank_reset(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ParticipantRequest>>,
) -> Result<Json<RankResetResponse>, AppError> {
    let group = rank_service::reset(&state, id, &payload.user_id).await?;
    Ok(Json(RankResetResponse { group }))
}

/// Signal the end of the current round for the caller.
#[utoipa::path(
    post,
    path = "/sessions/{id}/done",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ParticipantRequest,
    responses(
        (status = 200, description = "Signal recorded", body = BarrierResponse),
        (status = 409, description = "Already signalled or round not finished")
    )
)]
pub async fn done(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ParticipantRequest>>,
) -> Result<Json<BarrierResponse>, AppError> {
    let outcome = barrier::signal_done(&state, id, &payload.user_id).await?;
    Ok(Json(outcome.into()))
}

/// Take one life from a finalist.
#[utoipa::path(
    post,
    path = "/sessions/{id}/attacks",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = AttackRequest,
    responses(
        (status = 200, description = "Attack landed", body = AttackResponse),
        (status = 403, description = "Not the caller's turn")
    )
)]
pub async fn attack(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AttackRequest>>,
) -> Result<Json<AttackResponse>, AppError> {
    let outcome = attrition_service::attack(&state, id, &payload.user_id, payload.item_id).await?;
    Ok(Json(outcome.into()))
}
