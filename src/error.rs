use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VotingError {
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Voting is not open for this subject")]
    WindowClosed,
    #[error("Voter has already voted on this subject")]
    AlreadyVoted,
    #[error("Voter has used all available election votes")]
    VoteBudgetExhausted,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl VotingError {
    /// Stable machine-readable name sent to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            VotingError::Conflict(_) => "Conflict",
            VotingError::NotFound(_) => "NotFound",
            VotingError::WindowClosed => "WindowClosed",
            VotingError::AlreadyVoted => "AlreadyVoted",
            VotingError::VoteBudgetExhausted => "VoteBudgetExhausted",
            VotingError::Unauthorized => "Unauthorized",
            VotingError::InvalidRequest(_) => "InvalidRequest",
            VotingError::UpstreamUnavailable(_) => "UpstreamUnavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            VotingError::Conflict(_)
            | VotingError::WindowClosed
            | VotingError::AlreadyVoted
            | VotingError::VoteBudgetExhausted => StatusCode::CONFLICT,
            VotingError::NotFound(_) => StatusCode::NOT_FOUND,
            VotingError::Unauthorized => StatusCode::UNAUTHORIZED,
            VotingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            VotingError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Failures raised by the data store collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record already exists")]
    Duplicate,
    #[error("data store unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for VotingError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind(),
            "details": self.to_string()
        }));

        (self.status(), body).into_response()
    }
}

impl From<StoreError> for VotingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate => VotingError::Conflict("record already exists".to_string()),
            StoreError::Unavailable(msg) => VotingError::UpstreamUnavailable(msg),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Unavailable(error.to_string()),
        }
    }
}

impl From<tower_sessions::session::Error> for VotingError {
    fn from(error: tower_sessions::session::Error) -> Self {
        VotingError::UpstreamUnavailable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_rejections_map_to_conflict() {
        assert_eq!(VotingError::AlreadyVoted.status(), StatusCode::CONFLICT);
        assert_eq!(VotingError::VoteBudgetExhausted.status(), StatusCode::CONFLICT);
        assert_eq!(VotingError::WindowClosed.status(), StatusCode::CONFLICT);
        assert_eq!(
            VotingError::UpstreamUnavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn store_failures_surface_as_upstream_unavailable() {
        let err: VotingError = StoreError::Unavailable("connection reset".into()).into();
        assert_eq!(err.kind(), "UpstreamUnavailable");
    }
}
