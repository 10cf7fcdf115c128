use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage, HttpResponse,
};
use crate::request_id::RequestIdValue;
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use futures::future::{ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use uuid::Uuid;

/// User ID extracted from JWT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// JWT Authentication Middleware
///
/// Requests without a valid `Authorization: Bearer <token>` are answered with
/// a 401 `ErrorResponse` and never reach the wrapped service.
pub struct JwtAuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
}

/// Resolve the caller from an Authorization header value.
pub fn authenticate_header(header: Option<&str>) -> Result<Uuid, (&'static str, String)> {
    let header = header.ok_or((
        error_codes::TOKEN_MISSING,
        "Missing Authorization header".to_string(),
    ))?;

    let token = crypto_core::jwt::extract_bearer(header).ok_or((
        error_codes::TOKEN_INVALID,
        "Invalid Authorization header format".to_string(),
    ))?;

    crypto_core::jwt::get_user_id_from_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        (error_codes::TOKEN_INVALID, format!("Invalid token: {}", e))
    })
}

fn unauthorized(code: &str, message: &str, request_id: Option<String>) -> HttpResponse {
    let body = ErrorResponse::new("Unauthorized", message, 401, kinds::AUTHENTICATION_ERROR, code);
    let body = match request_id {
        Some(id) => body.with_trace_id(id),
        None => body,
    };
    HttpResponse::Unauthorized().json(body)
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let header = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|h| h.to_str().ok());

            match authenticate_header(header) {
                Ok(user_id) => {
                    req.extensions_mut().insert(UserId(user_id));
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err((code, message)) => {
                    let request_id = req.extensions().get::<RequestIdValue>().map(|r| r.0.clone());
                    let response = unauthorized(code, &message, request_id);
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}

/// FromRequest implementation for UserId
impl actix_web::FromRequest for UserId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<UserId>() {
            Some(user_id) => ready(Ok(*user_id)),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "User not authenticated",
            ))),
        }
    }
}
