use crate::state::AppState;
use crate::websocket::session::WsSession;
use actix_web::{get, http::header::AUTHORIZATION, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use crypto_core::jwt::{extract_bearer, get_user_id_from_token};
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Resolve the caller from `?token=` or `Authorization: Bearer`.
/// The query parameter wins when both are present.
fn authenticate(params: &WsParams, req: &HttpRequest) -> Result<Uuid, (&'static str, String)> {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| {
            req.headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer)
        })
        .ok_or((error_codes::TOKEN_MISSING, "missing access token".to_string()))?;

    get_user_id_from_token(token)
        .map_err(|e| (error_codes::TOKEN_INVALID, format!("invalid access token: {e}")))
}

/// GET /ws
///
/// Authentication happens before the upgrade; a rejected handshake gets a
/// 401 JSON body and the socket is never opened.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let user_id = match authenticate(&query, &req) {
        Ok(user_id) => user_id,
        Err((code, message)) => {
            tracing::warn!(code, reason = %message, "websocket handshake rejected");
            let body = ErrorResponse::new(
                "Unauthorized",
                &message,
                401,
                kinds::AUTHENTICATION_ERROR,
                code,
            );
            return Ok(HttpResponse::Unauthorized().json(body));
        }
    };

    tracing::debug!(user_id = %user_id, "websocket handshake authenticated");
    let session = WsSession::new(
        user_id,
        state.delivery.clone(),
        Duration::from_secs(state.config.typing_ttl_secs),
    );
    ws::start(session, &req, stream)
}
