//! Access log middleware
//!
//! One structured line per request once the response is ready. Wrap it
//! inside `RequestId` so the request ID is available; the caller's user ID
//! is picked up from the response's request when `JwtAuthMiddleware` ran.

use crate::jwt_auth::UserId;
use crate::request_id::RequestIdValue;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::time::Instant;

/// Paths polled by health checks and scrapers; logged at debug only
const QUIET_PATHS: &[&str] = &["/health", "/metrics"];

#[derive(Clone, Default)]
pub struct Logging;

impl<S, B> Transform<S, ServiceRequest> for Logging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggingService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggingService { service }))
    }
}

pub struct LoggingService<S> {
    service: S,
}

fn log_completed(
    method: &str,
    path: &str,
    request_id: &str,
    user_id: Option<String>,
    status: StatusCode,
    elapsed_ms: u64,
) {
    let user_id = user_id.unwrap_or_default();
    if QUIET_PATHS.contains(&path) {
        tracing::debug!(method, path, status = status.as_u16(), elapsed_ms, "request");
    } else if status.is_server_error() {
        tracing::error!(method, path, request_id, user_id = %user_id, status = status.as_u16(), elapsed_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(method, path, request_id, user_id = %user_id, status = status.as_u16(), elapsed_ms, "request rejected");
    } else {
        tracing::info!(method, path, request_id, user_id = %user_id, status = status.as_u16(), elapsed_ms, "request");
    }
}

impl<S, B> Service<ServiceRequest> for LoggingService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let request_id = req
            .extensions()
            .get::<RequestIdValue>()
            .map(|r| r.0.clone())
            .unwrap_or_default();

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let user_id = res
                .request()
                .extensions()
                .get::<UserId>()
                .map(|u| u.0.to_string());

            log_completed(
                &method,
                &path,
                &request_id,
                user_id,
                res.status(),
                start.elapsed().as_millis() as u64,
            );
            Ok(res)
        })
    }
}
