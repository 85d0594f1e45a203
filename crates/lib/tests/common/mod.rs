//! Shared test doubles: a recording chat channel, an in-memory user store, and
//! a bot context wired to them.

#![allow(dead_code)]

use async_trait::async_trait;
use lib::bot::BotContext;
use lib::channels::{BotIdentity, ChatChannel, EventScope, InboundEvent, OutboundMessage};
use lib::config::BotConfig;
use lib::router::Router;
use lib::storage::{UserRecord, UserStore};
use lib::tmdb::{ImageConfiguration, TmdbClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

/// Chat double that records texts, rich messages, and reactions.
pub struct RecordingChat {
    pub texts: Mutex<Vec<(String, String)>>,
    pub messages: Mutex<Vec<(String, OutboundMessage)>>,
    pub reactions: Mutex<Vec<(String, String, String)>>,
}

impl RecordingChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            texts: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
        })
    }

    pub async fn sent_texts(&self) -> Vec<String> {
        self.texts.lock().await.iter().map(|(_, t)| t.clone()).collect()
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().await.iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl ChatChannel for RecordingChat {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), String> {
        self.texts
            .lock()
            .await
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), String> {
        self.messages
            .lock()
            .await
            .push((channel_id.to_string(), message.clone()));
        Ok(())
    }

    async fn add_reaction(&self, channel_id: &str, ts: &str, name: &str) -> Result<(), String> {
        self.reactions.lock().await.push((
            channel_id.to_string(),
            ts.to_string(),
            name.to_string(),
        ));
        Ok(())
    }
}

/// In-memory user store.
pub struct MemoryUsers {
    records: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUsers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(HashMap::new()),
        })
    }

    pub async fn insert(&self, id: &str, name: &str) {
        self.records.lock().await.insert(
            id.to_string(),
            UserRecord {
                id: id.to_string(),
                name: Some(name.to_string()),
            },
        );
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn get(&self, id: &str) -> Option<UserRecord> {
        self.records.lock().await.get(id).cloned()
    }

    async fn save(&self, record: UserRecord) -> Result<String, String> {
        let id = record.id.clone();
        self.records.lock().await.insert(id.clone(), record);
        Ok(id)
    }
}

pub fn test_images() -> ImageConfiguration {
    serde_json::from_value(serde_json::json!({
        "base_url": "https://image.tmdb.org/t/p/",
        "poster_sizes": ["w92"],
        "profile_sizes": ["w45"]
    }))
    .expect("image configuration")
}

/// A bot wired to recording doubles, with all rules registered.
pub struct TestBot {
    pub ctx: Arc<BotContext>,
    pub router: Router,
    pub chat: Arc<RecordingChat>,
    pub users: Arc<MemoryUsers>,
    pub shutdown_rx: mpsc::Receiver<()>,
}

pub fn make_bot(tmdb_base: Option<String>) -> TestBot {
    let chat = RecordingChat::new();
    let users = MemoryUsers::new();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let sessions = BotContext::session_manager(chat.clone(), &BotConfig::default());
    let ctx = Arc::new(BotContext {
        chat: chat.clone(),
        users: users.clone(),
        tmdb: TmdbClient::new("test-key".to_string(), tmdb_base),
        images: test_images(),
        identity: BotIdentity {
            user_id: "UBOT".to_string(),
            name: "reelbot".to_string(),
        },
        sessions,
        started_at: Instant::now(),
        shutdown_tx,
        shutdown_delay: Duration::from_millis(0),
    });
    let mut router = Router::new();
    lib::bot::register_rules(&mut router, ctx.clone());
    TestBot {
        ctx,
        router,
        chat,
        users,
        shutdown_rx,
    }
}

pub fn dm(sender: &str, text: &str) -> InboundEvent {
    InboundEvent {
        sender_id: sender.to_string(),
        channel_id: "D1".to_string(),
        text: text.to_string(),
        ts: "1704067200.000100".to_string(),
        scope: EventScope::DirectMessage,
    }
}

/// Poll until the condition holds or ~2s pass. For side effects of spawned tasks.
pub async fn wait_until<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
