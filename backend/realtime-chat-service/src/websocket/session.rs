use super::events::{ClientEvent, ServerEvent, TypingPayload};
use super::handlers::{dispatch, AuthContext};
use super::ConnectionHandle;
use crate::metrics::WS_CONNECTIONS;
use crate::services::delivery::DeliveryCoordinator;
use actix::{
    Actor, ActorContext, ActorFutureExt, AsyncContext, SpawnHandle, StreamHandler, WrapFuture,
};
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Token verified, socket upgraded, not yet registered
    Connecting,
    /// Presence registered and private room joined
    Authenticated,
    /// Conversation rooms joined; events flow both ways
    RoomJoined { rooms: usize },
    Closed,
}

/// One authenticated WebSocket connection.
///
/// Outbound frames arrive through the connection handle's channel. Inbound
/// events go to a single worker task, so they are applied in arrival order.
pub struct WsSession {
    user_id: Uuid,
    delivery: Arc<DeliveryCoordinator>,
    state: ConnectionState,
    handle: Option<ConnectionHandle>,
    inbound: Option<UnboundedSender<ClientEvent>>,
    typing: HashMap<Uuid, SpawnHandle>,
    typing_ttl: Duration,
    hb: Instant,
}

impl WsSession {
    pub fn new(user_id: Uuid, delivery: Arc<DeliveryCoordinator>, typing_ttl: Duration) -> Self {
        Self {
            user_id,
            delivery,
            state: ConnectionState::Connecting,
            handle: None,
            inbound: None,
            typing: HashMap::new(),
            typing_ttl,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = %act.user_id, "websocket heartbeat timed out, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn enqueue(&self, event: ClientEvent) {
        if let Some(inbound) = &self.inbound {
            if inbound.send(event).is_err() {
                tracing::debug!(user_id = %self.user_id, "inbound worker gone, dropping event");
            }
        }
    }

    /// Arm or clear the auto-expiry timer for a typing indicator
    fn track_typing(&mut self, payload: &TypingPayload, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(previous) = self.typing.remove(&payload.conversation_id) {
            ctx.cancel_future(previous);
        }
        if !payload.is_typing {
            return;
        }

        let conversation_id = payload.conversation_id;
        let timer = ctx.run_later(self.typing_ttl, move |act, _ctx| {
            act.typing.remove(&conversation_id);
            act.enqueue(ClientEvent::Typing(TypingPayload {
                conversation_id,
                is_typing: false,
            }));
        });
        self.typing.insert(conversation_id, timer);
    }

    fn on_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(user_id = %self.user_id, error = %e, "malformed websocket frame");
                if let Some(frame) = ServerEvent::error(format!("malformed event: {e}")).to_frame() {
                    ctx.text(frame);
                }
                return;
            }
        };

        if let ClientEvent::Typing(payload) = &event {
            self.track_typing(payload, ctx);
        }
        self.enqueue(event);
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        WS_CONNECTIONS.inc();

        let (out_tx, out_rx) = unbounded_channel::<String>();
        ctx.add_stream(UnboundedReceiverStream::new(out_rx));
        let handle = ConnectionHandle::new(self.user_id, out_tx);

        let (in_tx, mut in_rx) = unbounded_channel::<ClientEvent>();
        let auth = AuthContext {
            user_id: self.user_id,
            connection: handle.clone(),
        };
        let delivery = self.delivery.clone();
        actix::spawn(async move {
            while let Some(event) = in_rx.recv().await {
                dispatch(&delivery, &auth, event).await;
            }
        });

        self.inbound = Some(in_tx);
        self.handle = Some(handle.clone());
        self.state = ConnectionState::Authenticated;
        tracing::info!(user_id = %self.user_id, connection_id = %handle.id, "websocket session started");

        let delivery = self.delivery.clone();
        ctx.spawn(
            async move { delivery.connect(&handle).await }
                .into_actor(self)
                .map(|joined, act, ctx| match joined {
                    Ok(rooms) if act.state != ConnectionState::Closed => {
                        act.state = ConnectionState::RoomJoined { rooms };
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(user_id = %act.user_id, error = %e, "failed to join conversation rooms");
                        ctx.stop();
                    }
                }),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state = ConnectionState::Closed;
        WS_CONNECTIONS.dec();
        // Dropping the sender lets the worker drain what is queued and exit
        self.inbound = None;

        let Some(handle) = self.handle.take() else {
            return;
        };
        tracing::info!(user_id = %self.user_id, connection_id = %handle.id, "websocket session stopped");

        let typing: Vec<Uuid> = self.typing.drain().map(|(conversation_id, _)| conversation_id).collect();
        let delivery = self.delivery.clone();
        let user_id = self.user_id;
        actix::spawn(async move {
            for conversation_id in typing {
                if let Err(e) = delivery.typing(conversation_id, user_id, false).await {
                    tracing::debug!(error = %e, "could not clear typing indicator");
                }
            }
            if let Err(e) = delivery.disconnect(&handle).await {
                tracing::warn!(user_id = %user_id, error = %e, "disconnect cleanup failed");
            }
        });
    }
}

/// Outbound frames queued by broadcasts
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.on_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                if let Some(frame) = ServerEvent::error("binary frames are not supported").to_frame() {
                    ctx.text(frame);
                }
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(user_id = %self.user_id, reason = ?reason, "websocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}
