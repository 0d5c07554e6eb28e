//! In-process store.
//!
//! Keeps transcripts and persona records in maps. Used when no database is
//! configured and by tests, which can inspect writes and simulate outages.

use super::{ChatHandle, ChatStore, PersonaRecord, StoreError, Transcript};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use parley_proto::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    transcripts: Mutex<HashMap<ChatHandle, Transcript>>,
    personas: DashMap<Address, PersonaRecord>,
    next_handle: AtomicU64,
    flushes: AtomicUsize,
    persona_saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful transcript writes so far.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Successful persona writes so far.
    pub fn persona_save_count(&self) -> usize {
        self.persona_saves.load(Ordering::SeqCst)
    }

    /// Make every operation fail with [`StoreError::Unavailable`] until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn transcript(&self, handle: ChatHandle) -> Option<Transcript> {
        self.transcripts.lock().get(&handle).cloned()
    }

    /// Saved transcripts owned by `owner`, ordered by handle.
    pub fn transcripts_of(&self, owner: &Address) -> Vec<(ChatHandle, Transcript)> {
        let mut found: Vec<_> = self
            .transcripts
            .lock()
            .iter()
            .filter(|(_, t)| &t.owner == owner)
            .map(|(h, t)| (*h, t.clone()))
            .collect();
        found.sort_by_key(|(h, _)| h.0);
        found
    }

    /// Drop a saved transcript, leaving any handle to it stale.
    pub fn delete_transcript(&self, handle: ChatHandle) -> bool {
        self.transcripts.lock().remove(&handle).is_some()
    }

    pub fn persona(&self, address: &Address) -> Option<PersonaRecord> {
        self.personas.get(address).map(|r| r.value().clone())
    }

    pub fn insert_persona(&self, record: PersonaRecord) {
        self.personas.insert(record.address.clone(), record);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn flush_chat(
        &self,
        prior: Option<ChatHandle>,
        transcript: &Transcript,
    ) -> Result<ChatHandle, StoreError> {
        self.check_available()?;
        let mut transcripts = self.transcripts.lock();
        let handle = match prior {
            Some(handle) if transcripts.contains_key(&handle) => handle,
            Some(stale) => {
                tracing::warn!(
                    handle = %stale,
                    thread = %transcript.thread_id,
                    "Saved transcript is gone, creating a new one"
                );
                ChatHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
            }
            None => ChatHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1),
        };
        transcripts.insert(handle, transcript.clone());
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    async fn load_persona(&self, address: &Address) -> Result<Option<PersonaRecord>, StoreError> {
        self.check_available()?;
        Ok(self.persona(address))
    }

    async fn save_persona(&self, record: &PersonaRecord) -> Result<(), StoreError> {
        self.check_available()?;
        self.insert_persona(record.clone());
        self.persona_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
