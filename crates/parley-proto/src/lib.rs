//! # parley-proto
//!
//! Boundary types shared between the parley routing core and the messaging
//! transport that carries its traffic.
//!
//! ## Features
//!
//! - Normalized bare addresses and resource-qualified full addresses
//! - Presence records with show state, priority and status text
//! - A decoded stanza model for messages, presence and room requests
//! - Optional serde support behind the `serde` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use parley_proto::{Address, Envelope, MessageStanza, Stanza};
//!
//! let alice: Address = "alice@example.com".parse().unwrap();
//! let bob: Address = "bob@example.com".parse().unwrap();
//!
//! let envelope = Envelope::new(
//!     alice.with_resource("laptop"),
//!     bob,
//!     Stanza::Message(MessageStanza::chat("hello").with_thread("t1")),
//! );
//! assert_eq!(envelope.stanza.kind(), "message");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod address;
pub mod error;
pub mod presence;
pub mod stanza;

pub use self::address::{Address, FullAddress};
pub use self::error::{ProtocolError, Result};
pub use self::presence::{Presence, Show};
pub use self::stanza::{
    Affiliation, ChatState, Envelope, Invitation, MessageKind, MessageStanza, Occupant,
    PresenceKind, PresenceStanza, Role, RoomStanza, Stanza,
};
