use utoipa::OpenApi;

#[derive(OpenApi)]
/// OpenAPI document of the reel-pick HTTP surface.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::list_sessions,
        crate::routes::sessions::populate_pool,
        crate::routes::sessions::deck,
        crate::routes::sessions::winner,
        crate::routes::rounds::accept_invite,
        crate::routes::rounds::swipe,
        crate::routes::rounds::groups,
        crate::routes::rounds::rank_pick,
        crate::routes::rounds::rank_reset,
        crate::routes::rounds::done,
        crate::routes::rounds::attack,
        crate::routes::feed::session_feed,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::PopulatePoolRequest,
            crate::dto::session::PhaseDto,
            crate::dto::session::SessionSummary,
            crate::dto::session::ItemSummary,
            crate::dto::session::StatusSummary,
            crate::dto::session::SessionDetailsResponse,
            crate::dto::session::PoolResponse,
            crate::dto::session::MovieDto,
            crate::dto::session::TitleCardDto,
            crate::dto::round::ParticipantRequest,
            crate::dto::round::SwipeRequest,
            crate::dto::round::RankPickRequest,
            crate::dto::round::AttackRequest,
            crate::dto::round::BarrierState,
            crate::dto::round::BarrierResponse,
            crate::dto::round::SwipeResponse,
            crate::dto::round::RankEntry,
            crate::dto::round::RankGroupDto,
            crate::dto::round::RankPickResponse,
            crate::dto::round::RankResetResponse,
            crate::dto::round::AttackResponse,
            crate::rules::scoring::SwipeAction,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle and pool"),
        (name = "rounds", description = "Swipe, rank and attrition rounds"),
        (name = "feed", description = "Server-sent change events"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_round_endpoints() {
        let doc = ApiDoc::openapi();
        for path in [
            "/sessions",
            "/sessions/{id}/swipes",
            "/sessions/{id}/attacks",
            "/sessions/{id}/feed",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
