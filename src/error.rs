use axum::{
    extract::rejection::{FormRejection, JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("voter has already voted on this poll")]
    AlreadyVoted,

    #[error("poll is not accepting votes")]
    PollClosed,

    #[error("creator has reached the poll limit")]
    QuotaExceeded,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidSelection(String),

    #[error("This poll is not accepting votes")]
    PollClosed,

    #[error("You have already voted on this poll")]
    AlreadyVoted,

    #[error("You must be logged in to do this")]
    LoginRequired,

    #[error("You are not allowed to do this")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("Could not determine the client address")]
    UnknownClient,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyVoted => AppError::AlreadyVoted,
            StoreError::PollClosed => AppError::PollClosed,
            StoreError::QuotaExceeded => {
                AppError::Validation("You have reached your poll limit.".to_string())
            }
            other => AppError::Store(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::InvalidSelection(_)
            | AppError::UnknownClient => StatusCode::BAD_REQUEST,
            AppError::LoginRequired => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::PollClosed | AppError::AlreadyVoted | AppError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            AppError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) | AppError::Store(StoreError::NotFound) => "not_found",
            AppError::Validation(_) => "validation_failed",
            AppError::InvalidSelection(_) => "invalid_selection",
            AppError::PollClosed => "poll_closed",
            AppError::AlreadyVoted => "already_voted",
            AppError::LoginRequired => "login_required",
            AppError::Forbidden => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::UnknownClient => "unknown_client",
            AppError::Internal(_) | AppError::Store(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "An unexpected error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}
