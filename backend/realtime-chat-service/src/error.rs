use crate::middleware::error_handling;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("user is not a participant of this conversation")]
    NotParticipant,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("cannot start a conversation with yourself")]
    SelfConversation,

    #[error("invalid group: {0}")]
    InvalidGroup(String),

    #[error("edit not allowed: {0}")]
    EditNotAllowed(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),

    #[error("media upload failed: {0}")]
    Upload(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::SelfConversation | AppError::InvalidGroup(_) => 400,
            AppError::Unauthorized => 401,
            AppError::NotParticipant | AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::EditNotAllowed(_) | AppError::Conflict(_) => 409,
            AppError::PayloadTooLarge(_) => 413,
            AppError::Upload(_) => 502,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal(_) => 500,
        }
    }

    /// Server-side failures are logged at error level, client mistakes at debug.
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
