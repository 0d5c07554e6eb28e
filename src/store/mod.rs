//! Storage abstraction for chat transcripts and persona records.
//!
//! The routing core only needs three things from durable storage: write a
//! chat transcript (replacing the previous save of the same chat), and load
//! or save a persona's configuration. Both back ends treat a stale prior
//! transcript handle as non-fatal and create a fresh record instead.

use async_trait::async_trait;
use parley_proto::Address;
use thiserror::Error;

pub mod memory;
pub mod redb;
pub mod types;

pub use memory::MemoryStore;
pub use redb::RedbStore;
pub use types::{ChatHandle, PersonaRecord, RosterRecord, Transcript};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The prior handle no longer names a saved transcript.
    #[error("stale transcript handle {0}")]
    StaleHandle(ChatHandle),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist `transcript`, replacing the record saved under `prior` if any.
    async fn flush_chat(
        &self,
        prior: Option<ChatHandle>,
        transcript: &Transcript,
    ) -> Result<ChatHandle, StoreError>;

    /// Load the saved configuration of a persona, if one exists.
    async fn load_persona(&self, address: &Address) -> Result<Option<PersonaRecord>, StoreError>;

    /// Persist the configuration of a persona.
    async fn save_persona(&self, record: &PersonaRecord) -> Result<(), StoreError>;
}
