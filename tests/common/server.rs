//! Test router management.
//!
//! Builds a switchboard over a memory store, a static directory and a
//! channel protocol so tests can inspect both persistence and the stanzas
//! that leave the router.

#![allow(dead_code)]

use parley_proto::{Address, Envelope};
use parleyd::Switchboard;
use parleyd::config::Config;
use parleyd::persona::PersonaRef;
use parleyd::services::{ChannelProtocol, Services, StaticDirectory};
use parleyd::store::MemoryStore;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::TestClient;

pub const DEFAULT_CONFIG: &str = r#"
[server]
name = "im.example.com"
domains = ["example.com"]
metrics_port = 0

[chat]
save_timeout_secs = 5
close_timeout_secs = 60
"#;

pub fn addr(s: &str) -> Address {
    s.parse().expect("valid address")
}

/// A router instance with its collaborators exposed.
pub struct TestRouter {
    pub hub: Arc<Switchboard>,
    pub store: Arc<MemoryStore>,
    outbound: mpsc::UnboundedReceiver<Envelope>,
}

impl TestRouter {
    pub fn spawn() -> Self {
        Self::with_config(DEFAULT_CONFIG)
    }

    pub fn with_config(toml: &str) -> Self {
        Self::with_directory(toml, StaticDirectory::new())
    }

    pub fn with_directory(toml: &str, directory: StaticDirectory) -> Self {
        let config = Config::parse(toml).expect("valid test config");
        let store = Arc::new(MemoryStore::new());
        let (protocol, outbound) = ChannelProtocol::new();
        let services = Services::new(Arc::new(protocol), store.clone(), Arc::new(directory));
        Self {
            hub: Switchboard::new(&config, services),
            store,
            outbound,
        }
    }

    /// Wait until every queued event has run.
    pub async fn settle(&self) {
        self.hub.settled().await;
    }

    /// Stanzas routed to non-local addresses since the last call.
    pub fn outbound(&mut self) -> Vec<Envelope> {
        let mut sent = Vec::new();
        while let Ok(envelope) = self.outbound.try_recv() {
            sent.push(envelope);
        }
        sent
    }

    /// Attach a new listener to a persona and wait for it to be registered.
    pub async fn attach(&self, persona: &str) -> TestClient {
        let client = TestClient::new();
        self.hub
            .add_listener(addr(persona), client.listener())
            .expect("dispatcher accepting");
        self.settle().await;
        client
    }

    /// The loaded persona, loading it if needed.
    pub async fn persona(&self, address: &str) -> PersonaRef {
        self.hub
            .registry()
            .get_or_load(&addr(address))
            .await
            .expect("persona loads")
    }
}
