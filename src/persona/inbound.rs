//! Stanzas delivered to a persona.

use parley_proto::{
    Address, ChatState, Envelope, FullAddress, Invitation, MessageKind, MessageStanza,
    PresenceKind, PresenceStanza, RoomStanza, Stanza,
};
use tracing::{debug, info};

use super::{Persona, message_notification};
use crate::chat::{NewMessage, Participant, TimerState};
use crate::error::RouterResult;
use crate::notify::Notification;
use crate::switchboard::Context;

impl Persona {
    /// Handle one inbound stanza.
    pub async fn receive(&mut self, ctx: &Context<'_>, envelope: Envelope) -> RouterResult {
        let Envelope { from, stanza, .. } = envelope;
        match stanza {
            Stanza::Message(message) => {
                self.receive_message(ctx, from, message);
                Ok(())
            }
            Stanza::Presence(presence) => {
                if self.chat_for_room(from.address()).is_some() {
                    self.receive_room_presence(ctx, from, presence);
                    Ok(())
                } else {
                    self.receive_presence(ctx, from, presence).await
                }
            }
            Stanza::Room(request) => {
                debug!(
                    persona = %self.address,
                    from = %from,
                    request = ?request,
                    "Room request addressed to a persona ignored"
                );
                Ok(())
            }
        }
    }

    fn receive_message(&mut self, ctx: &Context<'_>, from: FullAddress, mut message: MessageStanza) {
        if message.kind == MessageKind::Error {
            self.listeners.notify(Notification::Error {
                thread: message.thread,
                from: Some(from.address().clone()),
                text: message
                    .error
                    .or(message.body)
                    .unwrap_or_else(|| "message delivery failed".to_string()),
            });
            return;
        }
        if let Some(invite) = message.invite.take() {
            self.receive_invitation(ctx, from.address().clone(), invite);
            return;
        }

        let sender = from.address().clone();
        let room_thread = self.chat_for_room(&sender);
        let from_room = room_thread.is_some() || message.kind == MessageKind::GroupChat;
        if from_room && from.resource() == Some(self.nick()) {
            debug!(persona = %self.address, room = %sender, "Own room echo skipped");
            return;
        }

        let thread = match room_thread {
            Some(thread) => thread,
            None => self.inbound_thread(&sender, message.thread.as_deref()),
        };
        let owner = self.address.clone();
        let has_content = message.has_content();

        if has_content {
            let nick = from_room.then(|| from.resource().map(str::to_string)).flatten();
            let chat = self.chat_entry(&thread);
            if from_room {
                if !chat.is_multi_user() {
                    chat.make_multi_user(sender.clone());
                }
            } else {
                chat.add_participant(Participant::new(sender.clone()));
            }
            let logged = NewMessage::from(sender.clone(), message.body.unwrap_or_default())
                .with_subject(message.subject)
                .with_nick(nick)
                .to(owner.clone());
            chat.append(logged);
            chat.request_timer(TimerState::WaitingToSave, &owner, ctx.timers());
            let notification = chat
                .messages()
                .last()
                .map(|m| message_notification(&thread, m));
            if let Some(notification) = notification {
                self.listeners.notify(notification);
            }
        }

        let Some(state) = message.chat_state else {
            return;
        };
        let mut left = false;
        if let Some(chat) = self.chats.get_mut(&thread) {
            if state == ChatState::Gone && !chat.is_multi_user() {
                left = chat.remove_participant(&sender).is_some();
            }
            if !has_content {
                chat.request_timer(TimerState::WaitingToClose, &owner, ctx.timers());
            }
        }
        if left {
            self.listeners.notify(Notification::LeftChat {
                thread: thread.clone(),
                address: sender.clone(),
                nick: None,
            });
        }
        self.listeners.notify(Notification::Typing {
            thread: Some(thread),
            from: sender,
            state,
        });
    }

    /// Thread for a one-to-one message: the stanza's own thread, the open
    /// chat with the sender, or the sender's node.
    fn inbound_thread(&self, sender: &Address, thread: Option<&str>) -> String {
        if let Some(thread) = thread {
            return thread.to_string();
        }
        if let Some(thread) = self.find_one_to_one(sender) {
            return thread;
        }
        sender.node().unwrap_or(sender.as_str()).to_string()
    }

    fn receive_invitation(&mut self, ctx: &Context<'_>, room: Address, invite: Invitation) {
        let thread = self
            .chat_for_room(&room)
            .or_else(|| room.node().and_then(|node| self.thread_for_room_node(node)))
            .unwrap_or_else(|| room.node().unwrap_or(room.as_str()).to_string());
        let owner = self.address.clone();
        let converting = self
            .chats
            .get(&thread)
            .is_some_and(|chat| !chat.is_multi_user() && !chat.messages().is_empty());

        if converting {
            let from = self.full_address();
            let nick = self.nick().to_string();
            let chat = self.chat_entry(&thread);
            chat.make_multi_user(room.clone());
            ctx.deliver(Envelope::new(
                from,
                room.with_resource(nick.clone()),
                Stanza::Room(RoomStanza::Join { nick }),
            ));
            chat.append(NewMessage::system(
                "Automatically joining converted multi-user chat",
            ));
            chat.request_timer(TimerState::WaitingToSave, &owner, ctx.timers());
            let notification = chat
                .messages()
                .last()
                .map(|m| message_notification(&thread, m));
            if let Some(notification) = notification {
                self.listeners.notify(notification);
            }
            info!(persona = %owner, thread = %thread, room = %room, "Following chat into room");
            return;
        }

        let text = Self::invitation_text(&invite, &room);
        let chat = self.chat_entry(&thread);
        chat.make_multi_user(room.clone());
        chat.append(NewMessage::from(invite.from.clone(), text.clone()).to(owner.clone()));
        chat.request_timer(TimerState::WaitingToSave, &owner, ctx.timers());
        info!(persona = %owner, thread = %thread, room = %room, from = %invite.from, "Room invitation");
        self.listeners.notify(Notification::ChatInvite {
            thread,
            room,
            from: invite.from,
            text,
        });
    }

    /// Occupant presence relayed by a room the persona is in.
    fn receive_room_presence(&mut self, ctx: &Context<'_>, from: FullAddress, stanza: PresenceStanza) {
        let room = from.address().clone();
        let Some(thread) = self.chat_for_room(&room) else {
            return;
        };
        let owner = self.address.clone();
        let nick = from.resource().unwrap_or_default().to_string();
        let occupant = stanza.occupant.unwrap_or_default();
        let Some(address) = occupant
            .real_address
            .or_else(|| Address::from_parts(Some(&nick), room.domain()).ok())
        else {
            debug!(persona = %owner, room = %room, nick = %nick, "Occupant without usable address");
            return;
        };

        let Some(chat) = self.chats.get_mut(&thread) else {
            return;
        };
        let mut notifications = Vec::new();
        let line = match stanza.kind {
            PresenceKind::Available => {
                let participant = Participant {
                    address: address.clone(),
                    nick: Some(nick.clone()),
                    role: occupant.role,
                    affiliation: occupant.affiliation,
                };
                if !chat.add_participant(participant) {
                    return;
                }
                notifications.push(Notification::EnteredChat {
                    thread: thread.clone(),
                    address,
                    nick: Some(nick.clone()),
                });
                format!("{nick} has entered the chat.")
            }
            PresenceKind::Unavailable => {
                if chat.remove_participant(&address).is_none() {
                    return;
                }
                notifications.push(Notification::LeftChat {
                    thread: thread.clone(),
                    address,
                    nick: Some(nick.clone()),
                });
                format!("{nick} has left the chat.")
            }
            PresenceKind::Error => format!(
                "ERROR: {}",
                stanza.error.as_deref().unwrap_or("room reported an error")
            ),
            other => {
                debug!(persona = %owner, room = %room, kind = ?other, "Room presence ignored");
                return;
            }
        };

        chat.append(NewMessage::system(line));
        chat.request_timer(TimerState::WaitingToSave, &owner, ctx.timers());
        if let Some(message) = chat.messages().last() {
            notifications.push(message_notification(&thread, message));
        }
        for notification in notifications {
            self.listeners.notify(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaSettings;
    use std::sync::Arc;

    #[test]
    fn inbound_thread_prefers_stanza_thread_then_node() {
        let p = Persona::new(
            "alice@example.com".parse().unwrap(),
            Arc::new(PersonaSettings::default()),
        );
        let bob: Address = "bob@example.com".parse().unwrap();
        assert_eq!(p.inbound_thread(&bob, Some("t9")), "t9");
        assert_eq!(p.inbound_thread(&bob, None), "bob");
        let server: Address = "example.com".parse().unwrap();
        assert_eq!(p.inbound_thread(&server, None), "example.com");
    }
}
