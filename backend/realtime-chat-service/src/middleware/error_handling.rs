use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

/// Map domain errors to HTTP status and the shared error body
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_REQUEST),
        AppError::SelfConversation => (kinds::VALIDATION_ERROR, error_codes::SELF_CONVERSATION),
        AppError::InvalidGroup(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_GROUP),
        AppError::PayloadTooLarge(_) => (kinds::VALIDATION_ERROR, error_codes::UPLOAD_TOO_LARGE),
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_INVALID),
        AppError::NotParticipant => (
            kinds::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        ),
        AppError::Forbidden(_) => (kinds::AUTHORIZATION_ERROR, error_codes::NOT_MESSAGE_SENDER),
        AppError::NotFound("message") => (kinds::NOT_FOUND_ERROR, error_codes::MESSAGE_NOT_FOUND),
        AppError::NotFound("user") => (kinds::NOT_FOUND_ERROR, error_codes::USER_NOT_FOUND),
        AppError::NotFound(_) => (
            kinds::NOT_FOUND_ERROR,
            error_codes::CONVERSATION_NOT_FOUND,
        ),
        AppError::EditNotAllowed(_) => (kinds::CONFLICT_ERROR, error_codes::EDIT_NOT_ALLOWED),
        AppError::Conflict(_) => (
            kinds::CONFLICT_ERROR,
            error_codes::DIRECT_CONVERSATION_CONFLICT,
        ),
        AppError::Upload(_) => (kinds::SERVER_ERROR, error_codes::UPLOAD_FAILED),
        AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal(_) => {
            (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    // Internal details stay in the logs
    let message = if err.is_server_error() {
        "internal server error".to_string()
    } else {
        err.to_string()
    };

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    if err.is_server_error() {
        tracing::error!(error = %err, "request failed");
    } else {
        tracing::debug!(error = %err, "request rejected");
    }
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}
