//! Events and the built-in persona event handlers.

use async_trait::async_trait;
use parley_proto::{Address, Envelope, FullAddress, Presence, Stanza};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RouterResult;
use crate::notify::Listener;
use crate::persona::{OutgoingMessage, Persona, RosterEntry};
use crate::switchboard::Context;

/// The per-persona step of an event.
///
/// `handle` runs once for each target, with that target's persona locked
/// and no other persona lock held. Anything that must reach another persona
/// goes through [`Context::post`] or [`Context::deliver`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &Context<'_>, persona: &mut Persona) -> RouterResult;
}

/// A unit of work for the dispatcher: one handler applied to each target in order.
#[derive(Clone)]
pub struct Event {
    pub(super) targets: Vec<Address>,
    pub(super) handler: Arc<dyn EventHandler>,
}

impl Event {
    pub fn new(targets: Vec<Address>, handler: impl EventHandler + 'static) -> Self {
        Self {
            targets,
            handler: Arc::new(handler),
        }
    }

    pub fn single(target: Address, handler: impl EventHandler + 'static) -> Self {
        Self::new(vec![target], handler)
    }

    /// Share one handler between several events.
    pub fn shared(targets: Vec<Address>, handler: Arc<dyn EventHandler>) -> Self {
        Self { targets, handler }
    }

    pub fn targets(&self) -> &[Address] {
        &self.targets
    }

    pub fn name(&self) -> &'static str {
        self.handler.name()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name())
            .field("targets", &self.targets)
            .finish()
    }
}

/// Requests and deliveries applied to a persona.
#[derive(Clone)]
pub enum PersonaEvent {
    /// A stanza addressed to the persona.
    Receive(Envelope),
    /// One stanza fanned out to several local personas.
    Broadcast { from: FullAddress, stanza: Stanza },
    SendMessage {
        to: Address,
        thread: Option<String>,
        message: OutgoingMessage,
    },
    SetPresence(Presence),
    AddListener(Arc<dyn Listener>),
    RemoveListener(Uuid),
    PurgeListeners,
    Subscribe { buddy: Address, entry: RosterEntry },
    Unsubscribe { buddy: Address },
    AuthorizeSubscribe {
        requester: Address,
        authorized: bool,
        add: Option<RosterEntry>,
    },
    CloseChat { thread: String },
    JoinChat { room: Address, thread: Option<String> },
    AddUserToChat {
        thread: String,
        invitee: Address,
        text: Option<String>,
    },
    RefreshChats(Arc<dyn Listener>),
    RefreshRoster(Arc<dyn Listener>),
}

#[async_trait]
impl EventHandler for PersonaEvent {
    fn name(&self) -> &'static str {
        match self {
            PersonaEvent::Receive(_) => "receive",
            PersonaEvent::Broadcast { .. } => "broadcast",
            PersonaEvent::SendMessage { .. } => "send_message",
            PersonaEvent::SetPresence(_) => "set_presence",
            PersonaEvent::AddListener(_) => "add_listener",
            PersonaEvent::RemoveListener(_) => "remove_listener",
            PersonaEvent::PurgeListeners => "purge_listeners",
            PersonaEvent::Subscribe { .. } => "subscribe",
            PersonaEvent::Unsubscribe { .. } => "unsubscribe",
            PersonaEvent::AuthorizeSubscribe { .. } => "authorize_subscribe",
            PersonaEvent::CloseChat { .. } => "close_chat",
            PersonaEvent::JoinChat { .. } => "join_chat",
            PersonaEvent::AddUserToChat { .. } => "add_user_to_chat",
            PersonaEvent::RefreshChats(_) => "refresh_chats",
            PersonaEvent::RefreshRoster(_) => "refresh_roster",
        }
    }

    async fn handle(&self, ctx: &Context<'_>, persona: &mut Persona) -> RouterResult {
        match self {
            PersonaEvent::Receive(envelope) => persona.receive(ctx, envelope.clone()).await,
            PersonaEvent::Broadcast { from, stanza } => {
                let to = persona.address().clone();
                persona
                    .receive(ctx, Envelope::new(from.clone(), to, stanza.clone()))
                    .await
            }
            PersonaEvent::SendMessage {
                to,
                thread,
                message,
            } => persona
                .send_message(ctx, to.clone(), thread.clone(), message.clone())
                .await
                .map(|_| ()),
            PersonaEvent::SetPresence(presence) => {
                persona.set_my_presence(ctx, presence.clone()).await;
                Ok(())
            }
            PersonaEvent::AddListener(listener) => {
                persona.add_listener(ctx, Arc::clone(listener));
                Ok(())
            }
            PersonaEvent::RemoveListener(id) => {
                persona.remove_listener(ctx, *id);
                Ok(())
            }
            PersonaEvent::PurgeListeners => {
                persona.purge_listeners(ctx);
                Ok(())
            }
            PersonaEvent::Subscribe { buddy, entry } => {
                persona
                    .add_outgoing_subscription(ctx, buddy.clone(), entry.clone())
                    .await
            }
            PersonaEvent::Unsubscribe { buddy } => {
                persona.remove_outgoing_subscription(ctx, buddy.clone()).await
            }
            PersonaEvent::AuthorizeSubscribe {
                requester,
                authorized,
                add,
            } => {
                persona
                    .authorize_subscribe(ctx, requester.clone(), *authorized, add.clone())
                    .await
            }
            PersonaEvent::CloseChat { thread } => persona.close_chat(ctx, thread).await,
            PersonaEvent::JoinChat { room, thread } => {
                persona.join_chat(ctx, room.clone(), thread.clone());
                Ok(())
            }
            PersonaEvent::AddUserToChat {
                thread,
                invitee,
                text,
            } => {
                persona
                    .add_user_to_chat(ctx, thread, invitee.clone(), text.clone())
                    .await
            }
            PersonaEvent::RefreshChats(listener) => {
                persona.refresh_chats(listener);
                Ok(())
            }
            PersonaEvent::RefreshRoster(listener) => {
                persona.refresh_roster(listener);
                Ok(())
            }
        }
    }
}
