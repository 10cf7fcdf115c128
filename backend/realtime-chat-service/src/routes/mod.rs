pub mod chats;
pub mod messages;
pub mod wsroute;

use crate::metrics::metrics_handler;
use actix_middleware::JwtAuthMiddleware;
use actix_web::web;

/// Register every HTTP and WebSocket route. `/chats` sits behind JWT auth;
/// `/ws` authenticates its own handshake.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/chats")
            .wrap(JwtAuthMiddleware)
            .service(chats::list_chats)
            .service(chats::create_private_chat)
            .service(chats::create_group_chat)
            .service(messages::send_message)
            .service(messages::send_media_message)
            .service(messages::edit_message)
            .service(messages::delete_message)
            .service(chats::get_chat)
            .service(chats::toggle_mute)
            .service(chats::leave_chat)
            .service(chats::get_messages)
            .service(chats::search_messages)
            .service(chats::mark_read),
    )
    .service(wsroute::ws_handler)
    .route("/metrics", web::get().to(metrics_handler))
    .route("/health", web::get().to(|| async { "OK" }));
}
