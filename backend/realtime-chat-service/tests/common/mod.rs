#![allow(dead_code)]

use crypto_core::jwt::{generate_access_token, test_keys};
use realtime_chat_service::{
    config::Config,
    services::{MemoryBlobStore, MemoryChatRepository, MemoryUserDirectory},
    state::AppState,
    websocket::ConnectionHandle,
};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

pub struct TestApp {
    pub state: AppState,
    pub repo: Arc<MemoryChatRepository>,
    pub directory: Arc<MemoryUserDirectory>,
    pub blobs: Arc<MemoryBlobStore>,
}

pub fn test_app() -> TestApp {
    test_app_with(Config::test_defaults())
}

pub fn test_app_with(config: Config) -> TestApp {
    let repo = Arc::new(MemoryChatRepository::new());
    let directory = Arc::new(MemoryUserDirectory::new());
    let blobs = Arc::new(MemoryBlobStore::new("https://media.test"));
    let state = AppState::build(
        Arc::new(config),
        repo.clone(),
        directory.clone(),
        blobs.clone(),
    )
    .expect("state");

    TestApp {
        state,
        repo,
        directory,
        blobs,
    }
}

impl TestApp {
    /// New user registered in the directory under `name`
    pub fn user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.directory.insert(id, name);
        id
    }

    /// Register a live connection the way a session actor does
    pub async fn connect(&self, user_id: Uuid) -> Client {
        let (tx, rx) = unbounded_channel();
        let handle = ConnectionHandle::new(user_id, tx);
        self.state
            .delivery
            .connect(&handle)
            .await
            .expect("connect");
        Client { handle, rx }
    }
}

pub struct Client {
    pub handle: ConnectionHandle,
    pub rx: UnboundedReceiver<String>,
}

impl Client {
    /// Every frame queued so far, parsed
    pub fn drain(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("frame is JSON"));
        }
        frames
    }

    /// Frames with the given event name
    pub fn events(&mut self, name: &str) -> Vec<serde_json::Value> {
        self.drain()
            .into_iter()
            .filter(|f| f["event"] == name)
            .map(|f| f["data"].clone())
            .collect()
    }
}

pub fn token_for(user_id: Uuid) -> String {
    test_keys::init();
    generate_access_token(user_id, "user@example.com", "user").expect("token")
}
