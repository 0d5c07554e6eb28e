//! The switchboard: entry point of the routing core.
//!
//! Owns the persona registry, the dispatcher, the chat timers and the
//! external services. Every public request is turned into an event and
//! posted. Only eviction and shutdown lock personas on the caller's task.

use futures_util::FutureExt;
use parley_proto::{Address, Envelope, Presence};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::chat::{ChatKey, ChatTimers};
use crate::config::{Config, DispatchModeConfig};
use crate::dispatch::{DispatchMode, Dispatcher, Event, PersonaEvent};
use crate::error::RouterResult;
use crate::metrics;
use crate::notify::Listener;
use crate::persona::{OutgoingMessage, PersonaSettings, RosterEntry};
use crate::registry::PersonaRegistry;
use crate::services::{Protocol, Services};
use crate::store::ChatStore;
use crate::telemetry::spans;

/// Addressing rules shared by every persona.
#[derive(Debug, Clone)]
struct Routing {
    domains: Vec<String>,
    muc_prefix: String,
    log_chats: bool,
}

impl Routing {
    /// Local means served by this router. Room addresses never are.
    fn is_local(&self, address: &Address) -> bool {
        let domain = address.domain();
        if domain.starts_with(&self.muc_prefix) {
            return false;
        }
        self.domains.is_empty() || self.domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }
}

pub struct Switchboard {
    routing: Routing,
    registry: PersonaRegistry,
    dispatcher: Dispatcher,
    timers: ChatTimers,
    protocol: Arc<dyn Protocol>,
    store: Arc<dyn ChatStore>,
}

/// What an event handler may touch besides its own persona.
///
/// Other personas are reachable only by posting events or delivering stanzas.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    hub: &'a Switchboard,
}

impl<'a> Context<'a> {
    /// Route a stanza: local recipients get a receive event, others go to the protocol.
    pub fn deliver(&self, envelope: Envelope) {
        self.hub.deliver(envelope);
    }

    /// Queue a follow-up event.
    pub fn post(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.hub.dispatcher.post(event) {
            debug!(event = name, error = %e, "Follow-up event dropped");
        }
    }

    pub fn is_local(&self, address: &Address) -> bool {
        self.hub.routing.is_local(address)
    }

    pub fn store(&self) -> &'a dyn ChatStore {
        self.hub.store.as_ref()
    }

    pub fn timers(&self) -> &'a ChatTimers {
        &self.hub.timers
    }

    pub fn log_chats(&self) -> bool {
        self.hub.routing.log_chats
    }
}

impl Switchboard {
    /// Build a switchboard and start its dispatcher. Must be called inside a Tokio runtime.
    pub fn new(config: &Config, services: Services) -> Arc<Self> {
        let mode = match config.dispatch.mode {
            DispatchModeConfig::Serial => DispatchMode::Serial,
            DispatchModeConfig::Sharded => DispatchMode::Sharded {
                workers: config.dispatch.workers,
            },
        };
        let settings = Arc::new(PersonaSettings {
            resource: config.server.resource.clone(),
            muc_subdomain: config.server.muc_subdomain.clone(),
            first_seq: config.chat.first_seq,
        });
        let routing = Routing {
            domains: config.server.domains.clone(),
            muc_prefix: format!("{}.", config.server.muc_subdomain.to_ascii_lowercase()),
            log_chats: config.chat.log_chats,
        };
        let Services {
            protocol,
            store,
            directory,
        } = services;

        let hub = Arc::new_cyclic(|weak| Self {
            routing,
            registry: PersonaRegistry::new(directory, Arc::clone(&store), settings),
            dispatcher: Dispatcher::start(mode, weak.clone()),
            timers: ChatTimers::new(
                weak.clone(),
                config.chat.save_timeout(),
                config.chat.close_timeout(),
            ),
            protocol,
            store,
        });
        info!(server = %config.server.name, ?mode, "Switchboard started");
        hub
    }

    pub(crate) fn context(&self) -> Context<'_> {
        Context { hub: self }
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_local(&self, address: &Address) -> bool {
        self.routing.is_local(address)
    }

    /// Queue an event.
    pub fn post(&self, event: Event) -> RouterResult {
        self.dispatcher.post(event)
    }

    /// Resolves once every queued event, and everything those events posted, has run.
    pub async fn settled(&self) {
        self.dispatcher.settled().await;
    }

    /// Route a stanza originating inside this router.
    pub fn deliver(&self, envelope: Envelope) {
        let to = envelope.to.address().clone();
        if self.routing.is_local(&to) {
            metrics::record_packet_routed("local");
            if let Err(e) = self.post(Event::single(to, PersonaEvent::Receive(envelope))) {
                debug!(error = %e, "Local delivery dropped");
            }
        } else {
            metrics::record_packet_routed("remote");
            self.protocol.route(envelope);
        }
    }

    /// Accept a stanza from the transport for a local persona.
    pub fn receive(&self, envelope: Envelope) -> RouterResult {
        metrics::record_packet_routed("inbound");
        let to = envelope.to.address().clone();
        self.post(Event::single(to, PersonaEvent::Receive(envelope)))
    }

    pub fn send_message(
        &self,
        from: Address,
        to: Address,
        thread: Option<String>,
        message: OutgoingMessage,
    ) -> RouterResult {
        self.post(Event::single(
            from,
            PersonaEvent::SendMessage {
                to,
                thread,
                message,
            },
        ))
    }

    pub fn set_presence(&self, persona: Address, presence: Presence) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::SetPresence(presence)))
    }

    pub fn add_listener(&self, persona: Address, listener: Arc<dyn Listener>) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::AddListener(listener)))
    }

    pub fn remove_listener(&self, persona: Address, id: Uuid) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::RemoveListener(id)))
    }

    pub fn purge_listeners(&self, persona: Address) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::PurgeListeners))
    }

    pub fn subscribe(&self, persona: Address, buddy: Address, entry: RosterEntry) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::Subscribe { buddy, entry }))
    }

    pub fn unsubscribe(&self, persona: Address, buddy: Address) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::Unsubscribe { buddy }))
    }

    pub fn authorize_subscribe(
        &self,
        persona: Address,
        requester: Address,
        authorized: bool,
        add: Option<RosterEntry>,
    ) -> RouterResult {
        self.post(Event::single(
            persona,
            PersonaEvent::AuthorizeSubscribe {
                requester,
                authorized,
                add,
            },
        ))
    }

    pub fn close_chat(&self, persona: Address, thread: impl Into<String>) -> RouterResult {
        self.post(Event::single(
            persona,
            PersonaEvent::CloseChat {
                thread: thread.into(),
            },
        ))
    }

    pub fn join_chat(&self, persona: Address, room: Address, thread: Option<String>) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::JoinChat { room, thread }))
    }

    pub fn add_user_to_chat(
        &self,
        persona: Address,
        thread: impl Into<String>,
        invitee: Address,
        text: Option<String>,
    ) -> RouterResult {
        self.post(Event::single(
            persona,
            PersonaEvent::AddUserToChat {
                thread: thread.into(),
                invitee,
                text,
            },
        ))
    }

    pub fn refresh_chats(&self, persona: Address, listener: Arc<dyn Listener>) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::RefreshChats(listener)))
    }

    pub fn refresh_roster(&self, persona: Address, listener: Arc<dyn Listener>) -> RouterResult {
        self.post(Event::single(persona, PersonaEvent::RefreshRoster(listener)))
    }

    /// Called by a chat timer task once its delay has elapsed.
    pub(crate) async fn fire_chat_timer(&self, key: ChatKey, ticket: u64) {
        let Some(persona) = self.registry.find(&key.owner) else {
            debug!(persona = %key.owner, thread = %key.thread, "Timer fired for unloaded persona");
            return;
        };
        let ctx = self.context();
        let span = spans::chat_timer(&key.owner, &key.thread);
        let outcome = AssertUnwindSafe(async {
            let mut persona = persona.lock().await;
            persona.on_chat_timer(&ctx, &key.thread, ticket).await;
        })
        .catch_unwind()
        .instrument(span)
        .await;
        if outcome.is_err() {
            error!(persona = %key.owner, thread = %key.thread, "Chat timer panicked");
        }
    }

    /// Drop an idle persona from the cache after saving and closing its
    /// chats. Returns whether it was evicted; online personas and personas
    /// with unsaved state stay loaded. The next event reloads it from the
    /// store.
    pub async fn evict(&self, address: &Address) -> RouterResult<bool> {
        let canonical = self.registry.canonical(address).await;
        let Some(persona) = self.registry.find(&canonical) else {
            return Ok(false);
        };
        let ctx = self.context();
        let mut guard = persona.lock().await;
        if guard.is_evicted() || !guard.unload(&ctx).await? {
            debug!(persona = %canonical, "Persona kept loaded");
            return Ok(false);
        }
        self.registry.remove(&canonical);
        info!(persona = %canonical, "Persona evicted");
        Ok(true)
    }

    /// Stop accepting events, wait for running work, then flush every open chat.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown();
        self.dispatcher.settled().await;

        let ctx = self.context();
        let mut flushed = 0usize;
        for persona in self.registry.personas() {
            let mut persona = persona.lock().await;
            for thread in persona.chat_threads() {
                if let Err(e) = persona.close_chat(&ctx, &thread).await {
                    warn!(persona = %persona.address(), thread = %thread, error = %e, "Failed to close chat at shutdown");
                } else {
                    flushed += 1;
                }
            }
        }
        info!(chats = flushed, "Switchboard shut down");
    }
}
