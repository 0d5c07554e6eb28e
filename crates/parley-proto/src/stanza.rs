//! Stanzas exchanged with the messaging transport.
//!
//! The routing core never sees bytes. Inbound traffic arrives as an
//! [`Envelope`] already addressed and decoded by the transport, and outbound
//! traffic leaves the same way. Only the fields the core acts on are modelled.

use crate::{Address, FullAddress, Presence};

/// An addressed stanza.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    /// Sender, including the sending resource when known.
    pub from: FullAddress,
    /// Recipient. Room stanzas carry the nickname as resource.
    pub to: FullAddress,
    /// Payload.
    pub stanza: Stanza,
}

impl Envelope {
    /// Build an envelope.
    pub fn new(from: impl Into<FullAddress>, to: impl Into<FullAddress>, stanza: Stanza) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            stanza,
        }
    }
}

/// Stanza payloads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "stanza", rename_all = "snake_case")
)]
pub enum Stanza {
    /// A chat or groupchat message, possibly carrying only a chat-state indicator.
    Message(MessageStanza),
    /// Presence and subscription traffic.
    Presence(PresenceStanza),
    /// Multi-user room membership requests.
    Room(RoomStanza),
}

impl Stanza {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Stanza::Message(_) => "message",
            Stanza::Presence(_) => "presence",
            Stanza::Room(_) => "room",
        }
    }
}

impl From<MessageStanza> for Stanza {
    fn from(m: MessageStanza) -> Self {
        Stanza::Message(m)
    }
}

impl From<PresenceStanza> for Stanza {
    fn from(p: PresenceStanza) -> Self {
        Stanza::Presence(p)
    }
}

impl From<RoomStanza> for Stanza {
    fn from(r: RoomStanza) -> Self {
        Stanza::Room(r)
    }
}

/// Message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum MessageKind {
    /// One-to-one conversation.
    #[default]
    Chat,
    /// Message relayed by a multi-user room.
    GroupChat,
    /// Standalone message outside a conversation.
    Normal,
    /// Delivery error reported by the transport.
    Error,
}

/// Chat-state indicator carried alongside (or instead of) a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ChatState {
    /// Paying attention to the conversation.
    Active,
    /// Typing.
    Composing,
    /// Stopped typing.
    Paused,
    /// Left the conversation.
    Gone,
}

/// An invitation into a multi-user room, relayed by the room.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Invitation {
    /// Who sent the invitation.
    pub from: Address,
    /// Optional free-form reason.
    pub reason: Option<String>,
}

/// A message stanza.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageStanza {
    /// Message type.
    pub kind: MessageKind,
    /// Conversation thread identifier.
    pub thread: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Text body.
    pub body: Option<String>,
    /// Chat-state indicator.
    pub chat_state: Option<ChatState>,
    /// Room invitation.
    pub invite: Option<Invitation>,
    /// Error text for [`MessageKind::Error`].
    pub error: Option<String>,
}

impl MessageStanza {
    /// A one-to-one chat message with a body.
    pub fn chat(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// A message carrying only a chat-state indicator.
    pub fn indicator(state: ChatState) -> Self {
        Self {
            chat_state: Some(state),
            ..Self::default()
        }
    }

    /// Set the thread identifier.
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Set the message type.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Whether the stanza carries a subject or body worth logging.
    pub fn has_content(&self) -> bool {
        self.body.is_some() || self.subject.is_some()
    }
}

/// Presence stanza type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum PresenceKind {
    /// The sender is available.
    #[default]
    Available,
    /// The sender went away.
    Unavailable,
    /// The sender asks to receive the recipient's presence.
    Subscribe,
    /// The recipient's earlier subscribe request was granted.
    Subscribed,
    /// The sender no longer wants the recipient's presence.
    Unsubscribe,
    /// The sender revoked (or refused) the recipient's subscription.
    Unsubscribed,
    /// The sender asks for the recipient's current presence.
    Probe,
    /// Presence error reported by the transport.
    Error,
}

/// Room role of an occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Role {
    /// May moderate the room.
    Moderator,
    /// May speak.
    Participant,
    /// Read-only.
    Visitor,
    /// No role.
    #[default]
    None,
}

/// Long-lived room affiliation of an occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Affiliation {
    /// Created the room.
    Owner,
    /// Administers the room.
    Admin,
    /// Registered member.
    Member,
    /// Banned.
    Outcast,
    /// No affiliation.
    #[default]
    None,
}

/// Occupant details attached to presence relayed by a room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Occupant {
    /// The occupant's real address, if the room discloses it.
    pub real_address: Option<Address>,
    /// Current role.
    pub role: Role,
    /// Current affiliation.
    pub affiliation: Affiliation,
}

/// A presence stanza.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PresenceStanza {
    /// Stanza type.
    pub kind: PresenceKind,
    /// Reported presence. Ignored for subscription traffic.
    pub presence: Presence,
    /// Occupant details when relayed by a room.
    pub occupant: Option<Occupant>,
    /// Error text for [`PresenceKind::Error`].
    pub error: Option<String>,
}

impl PresenceStanza {
    /// A stanza of the given kind with default presence.
    pub fn of_kind(kind: PresenceKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// An available presence. OFFLINE presence maps to an unavailable stanza.
    pub fn from_presence(presence: Presence) -> Self {
        let kind = if presence.is_available() {
            PresenceKind::Available
        } else {
            PresenceKind::Unavailable
        };
        Self {
            kind,
            presence,
            ..Self::default()
        }
    }

    /// Attach occupant details.
    pub fn with_occupant(mut self, occupant: Occupant) -> Self {
        self.occupant = Some(occupant);
        self
    }
}

/// Requests addressed to a multi-user room. `to` carries `room/nick`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "action", rename_all = "snake_case")
)]
pub enum RoomStanza {
    /// Create the room and enter it.
    Create {
        /// Nickname to use inside the room.
        nick: String,
    },
    /// Enter an existing room.
    Join {
        /// Nickname to use inside the room.
        nick: String,
    },
    /// Leave the room.
    Leave {
        /// Nickname used inside the room.
        nick: String,
    },
    /// Ask the room to invite someone.
    Invite {
        /// Who to invite.
        invitee: Address,
        /// Optional text passed along with the invitation.
        reason: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Show;

    #[test]
    fn offline_presence_maps_to_unavailable() {
        let p = PresenceStanza::from_presence(Presence::new(Show::Offline, 3));
        assert_eq!(p.kind, PresenceKind::Unavailable);
        let p = PresenceStanza::from_presence(Presence::new(Show::Dnd, 3));
        assert_eq!(p.kind, PresenceKind::Available);
    }

    #[test]
    fn indicator_has_no_content() {
        assert!(!MessageStanza::indicator(ChatState::Composing).has_content());
        assert!(MessageStanza::chat("hi").has_content());
    }
}
