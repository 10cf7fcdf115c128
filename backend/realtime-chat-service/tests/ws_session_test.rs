mod common;

use actix_web::{web, App, HttpServer};
use common::{test_app_with, token_for, TestApp};
use futures::{SinkExt, StreamExt};
use realtime_chat_service::{config::Config, routes, websocket::Room};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

fn app_with_typing_ttl(secs: u64) -> TestApp {
    test_app_with(Config {
        typing_ttl_secs: secs,
        ..Config::test_defaults()
    })
}

/// Serve the app on an ephemeral port and return the `/ws` URL
fn serve(app: &TestApp) -> String {
    let state = app.state.clone();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .workers(1)
    .disable_signals()
    .listen(listener)
    .unwrap()
    .run();
    actix_rt::spawn(server);
    format!("ws://{addr}/ws")
}

async fn open(url: &str, user_id: Uuid) -> Socket {
    let (socket, _) = connect_async(format!("{url}?token={}", token_for(user_id)))
        .await
        .unwrap();
    socket
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    let started = Instant::now();
    while !ready() {
        assert!(started.elapsed() < WAIT, "condition not reached in time");
        sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the user's live connection has joined the conversation room
async fn wait_joined(app: &TestApp, user_id: Uuid, conversation_id: Uuid) {
    wait_until(|| {
        app.state
            .presence
            .connection_for(user_id)
            .is_some_and(|c| app.state.rooms.is_member(Room::Conversation(conversation_id), c.id))
    })
    .await;
}

/// Data of the next frame carrying `name`, skipping everything else
async fn next_event(socket: &mut Socket, name: &str) -> Value {
    timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(msg)) if msg.is_text() => {
                    let frame: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
                    if frame["event"] == name {
                        return frame["data"].clone();
                    }
                }
                Some(Ok(_)) => {}
                other => panic!("socket ended while waiting for {name}: {other:?}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {name} frame in time"))
}

async fn send_typing(socket: &mut Socket, conversation_id: Uuid, is_typing: bool) {
    let frame = json!({
        "event": "typing",
        "data": { "conversationId": conversation_id, "isTyping": is_typing }
    });
    socket.send(Message::text(frame.to_string())).await.unwrap();
}

#[actix_rt::test]
async fn typing_indicator_expires_without_refresh() {
    let app = app_with_typing_ttl(1);
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let url = serve(&app);

    let mut b = open(&url, bob).await;
    wait_joined(&app, bob, conv.id).await;
    let mut a = open(&url, alice).await;
    wait_joined(&app, alice, conv.id).await;

    send_typing(&mut a, conv.id, true).await;
    let started = next_event(&mut b, "userTyping").await;
    assert_eq!(started["userId"], json!(alice));
    assert_eq!(started["isTyping"], true);
    let since = Instant::now();

    let expired = next_event(&mut b, "userTyping").await;
    assert_eq!(expired["conversationId"], json!(conv.id));
    assert_eq!(expired["isTyping"], false);
    assert!(since.elapsed() >= Duration::from_millis(500));
}

#[actix_rt::test]
async fn closing_clears_typing_and_tears_down_the_session() {
    let app = app_with_typing_ttl(30);
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let url = serve(&app);

    let mut b = open(&url, bob).await;
    wait_joined(&app, bob, conv.id).await;
    let mut a = open(&url, alice).await;
    wait_joined(&app, alice, conv.id).await;

    let online = next_event(&mut b, "userOnline").await;
    assert_eq!(online["userId"], json!(alice));

    let connection = app.state.presence.connection_for(alice).unwrap();
    assert!(app.state.rooms.is_member(Room::User(alice), connection.id));

    send_typing(&mut a, conv.id, true).await;
    assert_eq!(next_event(&mut b, "userTyping").await["isTyping"], true);

    a.close(None).await.unwrap();

    let cleared = next_event(&mut b, "userTyping").await;
    assert_eq!(cleared["userId"], json!(alice));
    assert_eq!(cleared["isTyping"], false);
    let offline = next_event(&mut b, "userOffline").await;
    assert_eq!(offline["userId"], json!(alice));
    assert!(offline["lastActive"].is_string());

    wait_until(|| !app.state.presence.is_online(alice)).await;
    assert!(!app.state.rooms.is_member(Room::User(alice), connection.id));
    assert!(!app
        .state
        .rooms
        .is_member(Room::Conversation(conv.id), connection.id));
    assert!(app.directory.last_active(alice).is_some());
}

#[actix_rt::test]
async fn inbound_events_are_applied_in_arrival_order() {
    let app = app_with_typing_ttl(30);
    let alice = app.user("Alice");
    let bob = app.user("Bob");
    let (conv, _) = app
        .state
        .conversations
        .find_or_create_direct(alice, bob)
        .await
        .unwrap();
    let url = serve(&app);

    let mut b = open(&url, bob).await;
    wait_joined(&app, bob, conv.id).await;
    let mut a = open(&url, alice).await;
    wait_joined(&app, alice, conv.id).await;

    a.send(Message::text("{not json")).await.unwrap();
    let error = next_event(&mut a, "error").await;
    assert!(error["reason"].as_str().unwrap().starts_with("malformed event"));

    let sent: Vec<bool> = (0..12).map(|i| i % 2 == 0).collect();
    for is_typing in &sent {
        send_typing(&mut a, conv.id, *is_typing).await;
    }

    let mut relayed = Vec::with_capacity(sent.len());
    for _ in 0..sent.len() {
        let event = next_event(&mut b, "userTyping").await;
        relayed.push(event["isTyping"].as_bool().unwrap());
    }
    assert_eq!(relayed, sent);
}
