//! # Actix Middleware Library
//!
//! Unified middleware components for Nova Actix services
//!
//! ## Modules
//! - `jwt_auth`: JWT authentication middleware
//! - `logging`: request/response access logging
//! - `request_id`: `X-Request-ID` generation and propagation

pub mod jwt_auth;
pub mod logging;
pub mod request_id;

pub use jwt_auth::{JwtAuthMiddleware, UserId};
pub use logging::Logging;
pub use request_id::{RequestId, RequestIdValue};
