//! Test listener client.
//!
//! Wraps a channel listener and collects the notifications it receives.

#![allow(dead_code)]

use parleyd::notify::{ChannelListener, Listener, Notification};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct TestClient {
    listener: Arc<ChannelListener>,
    rx: mpsc::Receiver<Arc<Notification>>,
}

impl TestClient {
    pub fn new() -> Self {
        let (listener, rx) = ChannelListener::new(1024);
        Self { listener, rx }
    }

    pub fn listener(&self) -> Arc<dyn Listener> {
        self.listener.clone()
    }

    pub fn id(&self) -> Uuid {
        self.listener.id()
    }

    /// Everything received so far.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut received = Vec::new();
        while let Ok(notification) = self.rx.try_recv() {
            received.push((*notification).clone());
        }
        received
    }

    /// Bodies of chat messages received so far, in order.
    pub fn message_bodies(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Message { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }
}
