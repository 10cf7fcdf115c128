use super::events::{
    ClientEvent, JoinChatPayload, MessageDeliveredPayload, MessageSeenPayload, TypingPayload,
};
use super::ConnectionHandle;
use crate::error::AppResult;
use crate::metrics::WS_EVENTS_TOTAL;
use crate::services::delivery::DeliveryCoordinator;
use uuid::Uuid;

/// Identity of the connection an event arrived on
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub connection: ConnectionHandle,
}

/// Run one inbound event. Failures are logged and dropped; the client gets
/// no reply for a rejected event.
pub async fn dispatch(delivery: &DeliveryCoordinator, ctx: &AuthContext, event: ClientEvent) {
    let name = event.name();
    let result = match event {
        ClientEvent::Typing(payload) => on_typing(delivery, ctx, payload).await,
        ClientEvent::MessageSeen(payload) => on_message_seen(delivery, ctx, payload).await,
        ClientEvent::MessageDelivered(payload) => on_message_delivered(delivery, ctx, payload).await,
        ClientEvent::JoinChat(payload) => on_join_chat(delivery, ctx, payload).await,
    };

    match result {
        Ok(()) => WS_EVENTS_TOTAL.with_label_values(&[name, "ok"]).inc(),
        Err(e) => {
            WS_EVENTS_TOTAL.with_label_values(&[name, "rejected"]).inc();
            tracing::warn!(
                event = name,
                user_id = %ctx.user_id,
                connection_id = %ctx.connection.id,
                error = %e,
                "websocket event rejected"
            );
        }
    }
}

async fn on_typing(
    delivery: &DeliveryCoordinator,
    ctx: &AuthContext,
    payload: TypingPayload,
) -> AppResult<()> {
    delivery
        .typing(payload.conversation_id, ctx.user_id, payload.is_typing)
        .await
}

async fn on_message_seen(
    delivery: &DeliveryCoordinator,
    ctx: &AuthContext,
    payload: MessageSeenPayload,
) -> AppResult<()> {
    delivery
        .message_seen(payload.conversation_id, payload.message_id, ctx.user_id)
        .await
}

async fn on_message_delivered(
    delivery: &DeliveryCoordinator,
    ctx: &AuthContext,
    payload: MessageDeliveredPayload,
) -> AppResult<()> {
    delivery
        .message_delivered(payload.message_id, ctx.user_id)
        .await
}

async fn on_join_chat(
    delivery: &DeliveryCoordinator,
    ctx: &AuthContext,
    payload: JoinChatPayload,
) -> AppResult<()> {
    delivery
        .join_chat(payload.conversation_id, &ctx.connection)
        .await
}
