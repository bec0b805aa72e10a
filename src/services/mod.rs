/// Attrition round: attacks, turn rotation and the winner.
pub mod attrition_service;
/// Round completion barrier and phase-exit transformations.
pub mod barrier;
/// OpenAPI documentation generation.
pub mod documentation;
/// Change event publishing helpers.
pub mod feed_events;
/// Server-sent change feed per session.
pub mod feed_service;
/// Health check service.
pub mod health_service;
/// Rank round: groups, picks and resets.
pub mod rank_service;
/// Session creation, pool filling and lookups.
pub mod session_service;
/// Storage reconnection and degraded mode.
pub mod storage_supervisor;
/// Swipe round.
pub mod swipe_service;
