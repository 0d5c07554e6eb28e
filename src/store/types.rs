//! Records exchanged with the storage back ends.
//!
//! Both are stored as JSON so fields can be added without migrations.

use parley_proto::{Address, Presence};
use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::persona::Ask;
use crate::subscription::Subscription;

/// Opaque handle of a saved transcript, returned by the store on every flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHandle(pub u64);

impl std::fmt::Display for ChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Full serialized form of one chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub owner: Address,
    pub thread_id: String,
    pub multi_user: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<Address>,
    pub participants: Vec<Address>,
    pub first_seq: u64,
    pub messages: Vec<ChatMessage>,
    /// Milliseconds since the epoch.
    pub flushed_at: i64,
}

impl Transcript {
    /// Sequence number of the newest message (or `first_seq` when empty).
    pub fn highest_seq(&self) -> u64 {
        self.first_seq + self.messages.len() as u64
    }
}

/// Roster entry as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub subscription: Subscription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<Ask>,
}

/// Persona configuration as persisted: saved presence plus roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaRecord {
    pub address: Address,
    pub presence: Presence,
    #[serde(default)]
    pub roster: Vec<RosterRecord>,
}
