//! External collaborators of the routing core.
//!
//! The core talks to the outside world through three seams: a protocol
//! that carries stanzas to non-local addresses, a store that persists
//! transcripts and persona configuration, and a directory that maps
//! aliases to canonical persona addresses.

pub mod directory;
pub mod protocol;

pub use directory::{Directory, DirectoryError, StaticDirectory};
pub use protocol::{ChannelProtocol, LoggingProtocol, Protocol};

use std::sync::Arc;

use crate::store::{ChatStore, MemoryStore};

/// The collaborators a switchboard is built with.
#[derive(Clone)]
pub struct Services {
    pub protocol: Arc<dyn Protocol>,
    pub store: Arc<dyn ChatStore>,
    pub directory: Arc<dyn Directory>,
}

impl Services {
    pub fn new(
        protocol: Arc<dyn Protocol>,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            protocol,
            store,
            directory,
        }
    }

    /// Everything in memory, stanzas only logged.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(LoggingProtocol),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticDirectory::new()),
        )
    }
}
