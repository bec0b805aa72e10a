use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    rules::scoring::{PowerUp, ScoringError},
    state::{
        state_machine::{InvalidTransition, SessionPhase},
        turns::TurnError,
    },
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// A fav or skull was used with its counter at zero.
    #[error("no {0} power-up left")]
    PowerUpExhausted(PowerUp),
    /// The participant already acted on this target in the current round.
    #[error("duplicate action: {0}")]
    DuplicateAction(String),
    /// An attack came from someone other than the turn holder.
    #[error("not your turn: `{holder}` is playing")]
    NotYourTurn {
        /// Current turn holder.
        holder: String,
    },
    /// The participant already signalled completion of this round.
    #[error("already signalled completion of {phase:?}")]
    AlreadySignaled {
        /// Round that was signalled.
        phase: SessionPhase,
    },
    /// The session record is inconsistent.
    #[error("invalid session: {0}")]
    InvalidSession(String),
    /// The caller is not part of the session.
    #[error("`{0}` is not a participant of this session")]
    NotParticipant(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { record, .. } => ServiceError::InvalidState(format!(
                "`{record}` was modified concurrently; retry"
            )),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<ScoringError> for ServiceError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::PowerUpExhausted(power_up) => ServiceError::PowerUpExhausted(power_up),
            ScoringError::DuplicateAction { .. } | ScoringError::GroupAlreadyRanked { .. } => {
                ServiceError::DuplicateAction(err.to_string())
            }
            ScoringError::NotInGroup { .. } | ScoringError::IncompleteGroup { .. } => {
                ServiceError::InvalidInput(err.to_string())
            }
        }
    }
}

impl From<TurnError> for ServiceError {
    fn from(err: TurnError) -> Self {
        ServiceError::InvalidSession(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller may not perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Well-formed request the rules reject.
    #[error("unprocessable: {0}")]
    Unprocessable(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Timeout => AppError::ServiceUnavailable(message),
            ServiceError::PowerUpExhausted(_) => AppError::Unprocessable(message),
            ServiceError::DuplicateAction(_) | ServiceError::AlreadySignaled { .. } => {
                AppError::Conflict(message)
            }
            ServiceError::NotYourTurn { .. } | ServiceError::NotParticipant(_) => {
                AppError::Forbidden(message)
            }
            ServiceError::InvalidSession(_) => AppError::Internal(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}
