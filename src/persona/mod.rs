//! Personas: the in-memory representative of one local user.
//!
//! A persona owns its roster, groups, open chats, saved presence and the
//! live listener sessions attached to it. It is only ever touched through
//! `&mut Persona` obtained from its registry lock, so none of its state needs
//! interior synchronization. Effects on other personas leave as events or
//! routed stanzas; a persona never reaches into another persona directly.
//!
//! The implementation is split across:
//! - [`roster`]: buddies, groups and the subscription handshake
//! - [`chats`]: chat lifecycle for outbound requests and timers
//! - [`inbound`]: stanzas arriving from other personas or the transport

mod chats;
mod inbound;
mod roster;

use parley_proto::{Address, Envelope, FullAddress, PresenceStanza, Presence, Stanza};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chat::{ChatMessage, ChatSession};
use crate::dispatch::{Event, PersonaEvent};
use crate::metrics;
use crate::notify::{Listener, Listeners, Notification};
use crate::store::PersonaRecord;
use crate::switchboard::Context;

pub use chats::OutgoingMessage;
pub use roster::{Ask, Buddy, Group, RosterEntry};

/// Shared handle to a persona and its lock.
pub type PersonaRef = Arc<Mutex<Persona>>;

/// Settings every persona shares.
#[derive(Debug, Clone)]
pub struct PersonaSettings {
    /// Resource used on stanzas the persona originates.
    pub resource: String,
    /// Subdomain hosting multi-user rooms.
    pub muc_subdomain: String,
    /// Sequence offset for new chats.
    pub first_seq: u64,
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            resource: "parley".to_string(),
            muc_subdomain: "conference".to_string(),
            first_seq: 0,
        }
    }
}

pub struct Persona {
    address: Address,
    settings: Arc<PersonaSettings>,
    presence: Presence,
    buddies: BTreeMap<Address, Buddy>,
    groups: BTreeMap<String, Group>,
    pending_subscribes: BTreeSet<Address>,
    chats: BTreeMap<String, ChatSession>,
    listeners: Listeners,
    next_chat_id: u64,
    /// Set once the registry has dropped this persona.
    evicted: bool,
}

impl Persona {
    pub fn new(address: Address, settings: Arc<PersonaSettings>) -> Self {
        Self {
            address,
            settings,
            presence: Presence::default(),
            buddies: BTreeMap::new(),
            groups: BTreeMap::new(),
            pending_subscribes: BTreeSet::new(),
            chats: BTreeMap::new(),
            listeners: Listeners::default(),
            next_chat_id: 0,
            evicted: false,
        }
    }

    /// Rebuild a persona from its saved configuration.
    pub fn from_record(record: PersonaRecord, settings: Arc<PersonaSettings>) -> Self {
        let mut persona = Self::new(record.address, settings);
        persona.presence = record.presence;
        for entry in record.roster {
            persona.restore_buddy(entry);
        }
        persona
    }

    /// Configuration worth persisting: saved presence and roster.
    pub fn record(&self) -> PersonaRecord {
        PersonaRecord {
            address: self.address.clone(),
            presence: self.presence.clone(),
            roster: self.buddies.values().map(Buddy::record).collect(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn settings(&self) -> &PersonaSettings {
        &self.settings
    }

    /// Address plus the configured resource, used as the sender of stanzas.
    pub fn full_address(&self) -> FullAddress {
        self.address.with_resource(self.settings.resource.clone())
    }

    /// Nickname used inside rooms.
    pub fn nick(&self) -> &str {
        self.address.node().unwrap_or(self.address.as_str())
    }

    /// The saved local presence, regardless of whether anyone is connected.
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// True while at least one listener is attached.
    pub fn is_online(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// True once this instance has been dropped from the registry; a fresh
    /// one is loaded on next use.
    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// What others see: the saved presence while online, OFFLINE otherwise.
    pub fn effective_presence(&self) -> Presence {
        if self.is_online() {
            self.presence.clone()
        } else {
            self.presence.as_offline()
        }
    }

    pub fn chat(&self, thread: &str) -> Option<&ChatSession> {
        self.chats.get(thread)
    }

    pub fn chat_threads(&self) -> Vec<String> {
        self.chats.keys().cloned().collect()
    }

    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    /// Deliver a notification to every attached listener.
    pub fn notify(&self, notification: Notification) {
        self.listeners.notify(notification);
    }

    pub fn add_listener(&mut self, ctx: &Context<'_>, listener: Arc<dyn Listener>) {
        let was_offline = self.listeners.is_empty();
        if !self.listeners.add(listener) {
            return;
        }
        if was_offline {
            info!(persona = %self.address, "Persona online");
            self.push_my_presence(ctx, None);
        }
    }

    pub fn remove_listener(&mut self, ctx: &Context<'_>, id: Uuid) {
        if self.listeners.remove(id) && self.listeners.is_empty() {
            info!(persona = %self.address, "Persona offline");
            self.push_my_presence(ctx, None);
        }
    }

    /// Detach every listener at once.
    pub fn purge_listeners(&mut self, ctx: &Context<'_>) {
        if self.listeners.clear() > 0 {
            info!(persona = %self.address, "Listeners purged, persona offline");
            self.push_my_presence(ctx, None);
        }
    }

    /// Save a new local presence, then announce it.
    pub async fn set_my_presence(&mut self, ctx: &Context<'_>, presence: Presence) {
        self.presence = presence;
        self.persist(ctx).await;
        self.push_my_presence(ctx, None);
    }

    /// Announce the effective presence.
    ///
    /// With `to` set, only that address receives it. Otherwise the persona's
    /// own listeners, every buddy holding the incoming facet, and every room
    /// the persona is in.
    pub fn push_my_presence(&self, ctx: &Context<'_>, to: Option<&Address>) {
        let presence = self.effective_presence();
        let stanza = Stanza::Presence(PresenceStanza::from_presence(presence.clone()));
        let from = self.full_address();

        if let Some(to) = to {
            ctx.deliver(Envelope::new(from, to.clone(), stanza));
            return;
        }

        self.listeners.notify(Notification::Presence {
            address: self.address.clone(),
            presence,
        });

        let (local, remote): (Vec<Address>, Vec<Address>) = self
            .buddies
            .values()
            .filter(|b| b.subscription().is_incoming())
            .map(|b| b.address().clone())
            .partition(|a| ctx.is_local(a));

        if !local.is_empty() {
            ctx.post(Event::new(
                local,
                PersonaEvent::Broadcast {
                    from: from.clone(),
                    stanza: stanza.clone(),
                },
            ));
        }
        for buddy in remote {
            ctx.deliver(Envelope::new(from.clone(), buddy, stanza.clone()));
        }
        for room in self.chats.values().filter_map(ChatSession::room) {
            ctx.deliver(Envelope::new(
                from.clone(),
                room.with_resource(self.nick()),
                stanza.clone(),
            ));
        }
    }

    async fn persist(&self, ctx: &Context<'_>) {
        if let Err(e) = ctx.store().save_persona(&self.record()).await {
            warn!(persona = %self.address, error = %e, "Failed to save persona");
        }
    }

    /// Append to a chat, creating it with this persona as a participant.
    fn chat_entry(&mut self, thread: &str) -> &mut ChatSession {
        let owner = &self.address;
        let first_seq = self.settings.first_seq;
        self.chats.entry(thread.to_string()).or_insert_with(|| {
            metrics::chat_opened();
            let mut chat = ChatSession::new(thread, first_seq);
            chat.add_participant(crate::chat::Participant::new(owner.clone()));
            chat
        })
    }
}

fn message_notification(thread: &str, message: &ChatMessage) -> Notification {
    Notification::Message {
        thread: thread.to_string(),
        seq: message.seq,
        from: message.from.clone(),
        nick: message.nick.clone(),
        subject: message.subject.clone(),
        body: message.body.clone(),
        timestamp: message.timestamp,
    }
}

/// Room node derived from a thread id: lowercase, with address separators replaced.
pub(crate) fn room_node(thread: &str) -> String {
    thread
        .chars()
        .map(|c| {
            if c.is_whitespace() || matches!(c, '@' | '/' | '"' | '&' | '\'' | ':' | '<' | '>') {
                '%'
            } else {
                c
            }
        })
        .collect::<String>()
        .to_lowercase()
}
