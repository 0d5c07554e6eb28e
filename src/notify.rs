//! Notifications delivered to a persona's live listener sessions.
//!
//! Every state change a client should see is described by one
//! [`Notification`] value. Listener transports receive it behind an `Arc`
//! (one allocation per fan-out, however many sessions are attached) and
//! serialize it with [`Notification::to_json`] if they need a wire form.

use parley_proto::{Address, ChatState, Presence};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::persona::Ask;
use crate::subscription::Subscription;

/// One roster entry as shown to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterItem {
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub groups: Vec<String>,
    pub subscription: Subscription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<Ask>,
    pub presence: Presence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A message was logged in a chat (sent, received, or a system line).
    Message {
        thread: String,
        seq: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<Address>,
        #[serde(skip_serializing_if = "Option::is_none")]
        nick: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        body: String,
        timestamp: i64,
    },
    /// A chat-state indicator arrived.
    Typing {
        #[serde(skip_serializing_if = "Option::is_none")]
        thread: Option<String>,
        from: Address,
        state: ChatState,
    },
    /// The effective presence of an address changed (the persona's own included).
    Presence { address: Address, presence: Presence },
    /// Someone asked to receive this persona's presence.
    Subscribe { from: Address },
    /// The subscription with a buddy changed.
    Subscription {
        address: Address,
        state: Subscription,
        #[serde(skip_serializing_if = "Option::is_none")]
        ask: Option<Ask>,
    },
    /// Full roster snapshot.
    Roster { items: Vec<RosterItem> },
    EnteredChat {
        thread: String,
        address: Address,
        #[serde(skip_serializing_if = "Option::is_none")]
        nick: Option<String>,
    },
    LeftChat {
        thread: String,
        address: Address,
        #[serde(skip_serializing_if = "Option::is_none")]
        nick: Option<String>,
    },
    ChatInvite {
        thread: String,
        room: Address,
        from: Address,
        text: String,
    },
    ChatClosed { thread: String },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        thread: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<Address>,
        text: String,
    },
}

impl Notification {
    /// The serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Message { .. } => "message",
            Notification::Typing { .. } => "typing",
            Notification::Presence { .. } => "presence",
            Notification::Subscribe { .. } => "subscribe",
            Notification::Subscription { .. } => "subscription",
            Notification::Roster { .. } => "roster",
            Notification::EnteredChat { .. } => "entered_chat",
            Notification::LeftChat { .. } => "left_chat",
            Notification::ChatInvite { .. } => "chat_invite",
            Notification::ChatClosed { .. } => "chat_closed",
            Notification::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("listener queue is full")]
    Full,
    #[error("listener is closed")]
    Closed,
}

/// A live client session attached to a persona.
///
/// `deliver` is called with the persona locked and must not block.
pub trait Listener: Send + Sync {
    fn id(&self) -> Uuid;

    fn deliver(&self, notification: Arc<Notification>) -> Result<(), DeliveryError>;
}

/// Listener backed by a bounded channel. Full queues drop the notification.
pub struct ChannelListener {
    id: Uuid,
    tx: mpsc::Sender<Arc<Notification>>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<Notification>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let listener = Arc::new(Self {
            id: Uuid::new_v4(),
            tx,
        });
        (listener, rx)
    }
}

impl Listener for ChannelListener {
    fn id(&self) -> Uuid {
        self.id
    }

    fn deliver(&self, notification: Arc<Notification>) -> Result<(), DeliveryError> {
        self.tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Deliver to one listener, counting refusals.
pub fn deliver_to(listener: &dyn Listener, notification: Arc<Notification>) {
    let kind = notification.kind();
    if let Err(e) = listener.deliver(notification) {
        tracing::debug!(listener = %listener.id(), kind, error = %e, "Notification dropped");
        crate::metrics::record_notification_dropped();
    }
}

/// The live listener set of one persona.
#[derive(Default)]
pub struct Listeners {
    entries: Vec<Arc<dyn Listener>>,
}

impl Listeners {
    /// Attach a listener. Returns false if it was already attached.
    pub fn add(&mut self, listener: Arc<dyn Listener>) -> bool {
        if self.entries.iter().any(|l| l.id() == listener.id()) {
            return false;
        }
        self.entries.push(listener);
        true
    }

    /// Detach a listener. Returns false if it was not attached.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|l| l.id() != id);
        self.entries.len() != before
    }

    /// Detach everything, returning how many were attached.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn notify(&self, notification: Notification) {
        if self.entries.is_empty() {
            return;
        }
        let notification = Arc::new(notification);
        for listener in &self.entries {
            deliver_to(listener.as_ref(), Arc::clone(&notification));
        }
    }
}
