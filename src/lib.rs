//! parleyd - presence and chat routing core.
//!
//! Every local user is represented by a [`persona::Persona`] that owns its
//! roster, open chats and live listener sessions. Requests and inbound
//! stanzas become events on the [`dispatch::Dispatcher`], which applies them
//! to one persona at a time under that persona's lock. The
//! [`switchboard::Switchboard`] wires the registry, dispatcher, chat timers
//! and external services together and is the only entry point callers need.

pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod metrics;
pub mod notify;
pub mod persona;
pub mod presence;
pub mod registry;
pub mod services;
pub mod store;
pub mod subscription;
pub mod switchboard;
pub mod telemetry;

pub use error::{RouterError, RouterResult};
pub use switchboard::{Context, Switchboard};
