//! Chat lifecycle driven by the persona's own requests and by chat timers.

use parley_proto::{
    Address, ChatState, Envelope, Invitation, MessageKind, MessageStanza, RoomStanza, Stanza,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Persona, message_notification, room_node};
use crate::chat::{FlushOutcome, NewMessage, Participant, TimerKind, TimerState};
use crate::error::{RouterError, RouterResult};
use crate::metrics;
use crate::notify::{Listener, Notification, deliver_to};
use crate::switchboard::Context;

/// A message a persona's client asks to send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub chat_state: Option<ChatState>,
}

impl OutgoingMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            chat_state: Some(ChatState::Active),
            ..Self::default()
        }
    }

    /// Only a chat-state indicator, nothing to log.
    pub fn indicator(state: ChatState) -> Self {
        Self {
            chat_state: Some(state),
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn has_content(&self) -> bool {
        self.body.is_some() || self.subject.is_some()
    }

    fn stanza(&self, thread: &str, kind: MessageKind) -> MessageStanza {
        MessageStanza {
            kind,
            thread: Some(thread.to_string()),
            subject: self.subject.clone(),
            body: self.body.clone(),
            chat_state: self.chat_state,
            ..MessageStanza::default()
        }
    }
}

/// Reason sent with invitations issued by `/add`.
const ADD_COMMAND_REASON: &str = "Please join my chat";

/// A command typed into a chat instead of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatCommand {
    /// `/add <address>`: invite someone, converting the chat into a room.
    Add(Address),
    /// `/join <room>`: bind the chat to a room and enter it.
    Join(Address),
    /// `/info`: describe the chat to the sender.
    Info,
}

impl ChatCommand {
    /// `None` when `body` is not one of the known commands; such text is
    /// sent as an ordinary message.
    fn parse(body: &str) -> Option<Result<Self, String>> {
        let mut words = body.split_whitespace();
        let command = match words.next()? {
            "/add" => Self::Add,
            "/join" => Self::Join,
            "/info" => return Some(Ok(Self::Info)),
            _ => return None,
        };
        let Some(argument) = words.next() else {
            return Some(Err(format!("usage: {} <address>", body.trim())));
        };
        Some(
            argument
                .parse::<Address>()
                .map(command)
                .map_err(|e| format!("{argument}: {e}")),
        )
    }
}

impl Persona {
    /// One-to-one chat already open with `peer`, if any.
    pub(super) fn find_one_to_one(&self, peer: &Address) -> Option<String> {
        self.chats
            .iter()
            .find(|(_, chat)| {
                !chat.is_multi_user() && chat.participant_count() <= 2 && chat.has_participant(peer)
            })
            .map(|(thread, _)| thread.clone())
    }

    /// Thread of the chat bound to `room`, if any.
    pub(super) fn chat_for_room(&self, room: &Address) -> Option<String> {
        self.chats
            .iter()
            .find(|(_, chat)| chat.room() == Some(room))
            .map(|(thread, _)| thread.clone())
    }

    /// Thread whose derived room node is `node`.
    pub(super) fn thread_for_room_node(&self, node: &str) -> Option<String> {
        self.chats
            .keys()
            .find(|thread| room_node(thread) == node)
            .cloned()
    }

    fn next_thread_id(&mut self) -> String {
        let node = self.address.node().unwrap_or_default().to_string();
        let domain = self.address.domain().to_string();
        loop {
            self.next_chat_id += 1;
            let id = format!("chat-{node}%{domain}-{}", self.next_chat_id);
            if !self.chats.contains_key(&id) {
                return id;
            }
        }
    }

    fn muc_domain(&self) -> String {
        format!("{}.{}", self.settings.muc_subdomain, self.address.domain())
    }

    /// Send a message, opening a chat when needed. Returns the thread used.
    ///
    /// Without an explicit thread the open one-to-one chat with `to` is
    /// reused, else a new thread id is generated. Indicator-only messages
    /// for a thread with no open chat are sent without creating one.
    pub async fn send_message(
        &mut self,
        ctx: &Context<'_>,
        to: Address,
        thread: Option<String>,
        message: OutgoingMessage,
    ) -> RouterResult<String> {
        let thread = match thread {
            Some(thread) => thread,
            None => match self.find_one_to_one(&to) {
                Some(thread) => thread,
                None => self.next_thread_id(),
            },
        };
        let from = self.full_address();

        if !message.has_content() && !self.chats.contains_key(&thread) {
            let stanza = message.stanza(&thread, MessageKind::Chat);
            ctx.deliver(Envelope::new(from, to, Stanza::Message(stanza)));
            return Ok(thread);
        }

        let owner = self.address.clone();
        if let Some(command) = message.body.as_deref().and_then(ChatCommand::parse) {
            let chat = self.chat_entry(&thread);
            if !chat.is_multi_user() {
                chat.add_participant(Participant::new(to));
            }
            chat.request_timer(TimerState::WaitingToClose, &owner, ctx.timers());
            self.run_chat_command(ctx, &thread, command).await?;
            return Ok(thread);
        }

        let nick = self.nick().to_string();
        let chat = self.chat_entry(&thread);

        let logged = if chat.is_multi_user() {
            let room = chat
                .room()
                .cloned()
                .ok_or_else(|| RouterError::Internal(format!("room chat {thread} has no room")))?;
            let stanza = message.stanza(&thread, MessageKind::GroupChat);
            ctx.deliver(Envelope::new(from, room, Stanza::Message(stanza)));
            NewMessage {
                from: Some(owner.clone()),
                nick: Some(nick),
                to: None,
                subject: message.subject.clone(),
                body: message.body.clone().unwrap_or_default(),
            }
        } else {
            chat.add_participant(Participant::new(to.clone()));
            let stanza = message.stanza(&thread, MessageKind::Chat);
            ctx.deliver(Envelope::new(from, to.clone(), Stanza::Message(stanza)));
            NewMessage {
                from: Some(owner.clone()),
                nick: None,
                to: Some(to),
                subject: message.subject.clone(),
                body: message.body.clone().unwrap_or_default(),
            }
        };

        if !message.has_content() {
            chat.request_timer(TimerState::WaitingToClose, &owner, ctx.timers());
            return Ok(thread);
        }

        chat.append(logged);
        chat.request_timer(TimerState::WaitingToSave, &owner, ctx.timers());
        let notification = chat
            .messages()
            .last()
            .map(|m| message_notification(&thread, m));
        if let Some(notification) = notification {
            self.listeners.notify(notification);
        }
        Ok(thread)
    }

    /// Flush and discard a chat, telling the other side we left.
    pub async fn close_chat(&mut self, ctx: &Context<'_>, thread: &str) -> RouterResult {
        let Some(mut chat) = self.chats.remove(thread) else {
            return Err(RouterError::NoSuchChat(thread.to_string()));
        };
        chat.cancel_timer();
        let outcome = chat.flush(&self.address, ctx.store(), ctx.log_chats()).await;
        chat.mark_closed();
        metrics::chat_closed();

        let from = self.full_address();
        if let Some(room) = chat.room() {
            let nick = self.nick().to_string();
            ctx.deliver(Envelope::new(
                from,
                room.with_resource(nick.clone()),
                Stanza::Room(RoomStanza::Leave { nick }),
            ));
        } else {
            for participant in chat.participants() {
                if participant.address == self.address {
                    continue;
                }
                let stanza = MessageStanza::indicator(ChatState::Gone).with_thread(thread);
                ctx.deliver(Envelope::new(
                    from.clone(),
                    participant.address,
                    Stanza::Message(stanza),
                ));
            }
        }

        info!(
            persona = %self.address,
            thread,
            flush = outcome.as_str(),
            messages = chat.messages().len(),
            "Chat closed"
        );
        self.listeners.notify(Notification::ChatClosed {
            thread: thread.to_string(),
        });
        Ok(())
    }

    /// Save and close every chat so this instance can be dropped.
    ///
    /// Returns false, leaving everything open, while the persona is still in
    /// use (listeners or unanswered subscription requests) or when a chat
    /// cannot be written.
    pub(crate) async fn unload(&mut self, ctx: &Context<'_>) -> RouterResult<bool> {
        if self.is_online() || !self.pending_subscribes.is_empty() {
            return Ok(false);
        }
        for (thread, chat) in self.chats.iter_mut() {
            if chat.flush(&self.address, ctx.store(), ctx.log_chats()).await == FlushOutcome::Failed {
                warn!(persona = %self.address, thread = %thread, "Chat not saved, persona kept");
                return Ok(false);
            }
        }
        for thread in self.chat_threads() {
            self.close_chat(ctx, &thread).await?;
        }
        self.evicted = true;
        Ok(true)
    }

    /// Enter a multi-user room. Returns the thread bound to it.
    pub fn join_chat(&mut self, ctx: &Context<'_>, room: Address, thread: Option<String>) -> String {
        let thread = thread
            .or_else(|| self.chat_for_room(&room))
            .or_else(|| room.node().and_then(|node| self.thread_for_room_node(node)))
            .unwrap_or_else(|| room.node().unwrap_or(room.as_str()).to_string());
        let from = self.full_address();
        let nick = self.nick().to_string();

        let chat = self.chat_entry(&thread);
        chat.make_multi_user(room.clone());
        ctx.deliver(Envelope::new(
            from,
            room.with_resource(nick.clone()),
            Stanza::Room(RoomStanza::Join { nick }),
        ));
        info!(persona = %self.address, thread = %thread, room = %room, "Joining room");
        thread
    }

    /// Invite someone into a chat, converting a one-to-one chat into a room first.
    pub async fn add_user_to_chat(
        &mut self,
        ctx: &Context<'_>,
        thread: &str,
        invitee: Address,
        text: Option<String>,
    ) -> RouterResult {
        let owner = self.address.clone();
        let from = self.full_address();
        let nick = self.nick().to_string();
        let muc_domain = self.muc_domain();

        let chat = self
            .chats
            .get_mut(thread)
            .ok_or_else(|| RouterError::NoSuchChat(thread.to_string()))?;

        let room = match chat.room() {
            Some(room) => room.clone(),
            None => {
                let room = Address::from_parts(Some(&room_node(thread)), &muc_domain)?;
                chat.make_multi_user(room.clone());
                ctx.deliver(Envelope::new(
                    from.clone(),
                    room.with_resource(nick.clone()),
                    Stanza::Room(RoomStanza::Create { nick }),
                ));
                for participant in chat.participants() {
                    if participant.address == owner || participant.address == invitee {
                        continue;
                    }
                    ctx.deliver(Envelope::new(
                        from.clone(),
                        room.clone(),
                        Stanza::Room(RoomStanza::Invite {
                            invitee: participant.address,
                            reason: None,
                        }),
                    ));
                }
                info!(persona = %owner, thread, room = %room, "Chat converted to room");
                room
            }
        };

        ctx.deliver(Envelope::new(
            from,
            room,
            Stanza::Room(RoomStanza::Invite {
                invitee,
                reason: text,
            }),
        ));
        Ok(())
    }

    /// Replay every open chat to one listener.
    pub fn refresh_chats(&self, listener: &Arc<dyn Listener>) {
        for (thread, chat) in &self.chats {
            for message in chat.messages() {
                deliver_to(
                    listener.as_ref(),
                    Arc::new(message_notification(thread, message)),
                );
            }
        }
    }

    /// A save or close timer fired for one of this persona's chats.
    pub(crate) async fn on_chat_timer(&mut self, ctx: &Context<'_>, thread: &str, ticket: u64) {
        let owner = self.address.clone();
        let Some(chat) = self.chats.get_mut(thread) else {
            debug!(persona = %owner, thread, "Timer fired for a closed chat");
            return;
        };
        match chat.take_fired_timer(ticket) {
            None => debug!(persona = %owner, thread, ticket, "Stale chat timer ignored"),
            Some(TimerKind::Save) => {
                chat.flush(&owner, ctx.store(), ctx.log_chats()).await;
                chat.request_timer(TimerState::WaitingToClose, &owner, ctx.timers());
            }
            Some(TimerKind::Close) => {
                if let Err(e) = self.close_chat(ctx, thread).await {
                    warn!(persona = %owner, thread, error = %e, "Failed to close idle chat");
                }
            }
        }
    }

    async fn run_chat_command(
        &mut self,
        ctx: &Context<'_>,
        thread: &str,
        command: Result<ChatCommand, String>,
    ) -> RouterResult {
        match command {
            Err(text) => {
                self.listeners.notify(Notification::Error {
                    thread: Some(thread.to_string()),
                    from: None,
                    text,
                });
                Ok(())
            }
            Ok(ChatCommand::Add(invitee)) => {
                info!(persona = %self.address, thread, invitee = %invitee, "Adding user to chat");
                self.add_user_to_chat(ctx, thread, invitee, Some(ADD_COMMAND_REASON.to_string()))
                    .await
            }
            Ok(ChatCommand::Join(room)) => {
                self.join_chat(ctx, room, Some(thread.to_string()));
                Ok(())
            }
            Ok(ChatCommand::Info) => {
                let Some(chat) = self.chats.get(thread) else {
                    return Err(RouterError::NoSuchChat(thread.to_string()));
                };
                let body = chat.describe();
                self.listeners.notify(Notification::Message {
                    thread: thread.to_string(),
                    seq: 0,
                    from: None,
                    nick: None,
                    subject: None,
                    body,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                });
                Ok(())
            }
        }
    }

    /// Invitation text shown to the invitee.
    pub(super) fn invitation_text(invite: &Invitation, room: &Address) -> String {
        match &invite.reason {
            Some(reason) => format!("{reason} (/join {room})"),
            None => format!(
                "{} has invited you into a groupchat (/join {room})",
                invite.from
            ),
        }
    }
}
