//! Persona registry: the cache of loaded personas.
//!
//! Personas are created lazily the first time an event targets them. The
//! cache itself is a concurrent map; creation is serialized behind one async
//! lock with a second cache check, so two workers racing on the same new
//! address end up sharing one persona.

use dashmap::DashMap;
use parley_proto::Address;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::RouterResult;
use crate::metrics;
use crate::persona::{Persona, PersonaRef, PersonaSettings};
use crate::services::Directory;
use crate::store::ChatStore;

pub struct PersonaRegistry {
    personas: DashMap<Address, PersonaRef>,
    /// Directory answers, keyed by the address asked about.
    aliases: DashMap<Address, Address>,
    load_lock: Mutex<()>,
    directory: Arc<dyn Directory>,
    store: Arc<dyn ChatStore>,
    settings: Arc<PersonaSettings>,
}

impl PersonaRegistry {
    pub fn new(
        directory: Arc<dyn Directory>,
        store: Arc<dyn ChatStore>,
        settings: Arc<PersonaSettings>,
    ) -> Self {
        Self {
            personas: DashMap::new(),
            aliases: DashMap::new(),
            load_lock: Mutex::new(()),
            directory,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &Arc<PersonaSettings> {
        &self.settings
    }

    /// Look up a loaded persona by its canonical address.
    pub fn find(&self, address: &Address) -> Option<PersonaRef> {
        self.personas.get(address).map(|p| Arc::clone(p.value()))
    }

    /// Canonical form of `address`.
    ///
    /// Aliases are resolved through the directory once and remembered. A
    /// directory failure falls back to treating `address` as canonical
    /// without remembering the answer.
    pub async fn canonical(&self, address: &Address) -> Address {
        if self.personas.contains_key(address) {
            return address.clone();
        }
        if let Some(canonical) = self.aliases.get(address) {
            return canonical.value().clone();
        }
        let canonical = match self.directory.resolve_canonical(address).await {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(address = %address, error = %e, "Directory lookup failed, using address as is");
                return address.clone();
            }
        };
        if canonical != *address {
            debug!(alias = %address, canonical = %canonical, "Alias resolved");
        }
        self.aliases.insert(address.clone(), canonical.clone());
        canonical
    }

    /// The persona for `address`, loading or creating it on first use.
    pub async fn get_or_load(&self, address: &Address) -> RouterResult<PersonaRef> {
        if let Some(persona) = self.find(address) {
            return Ok(persona);
        }

        let canonical = self.canonical(address).await;
        if canonical != *address {
            if let Some(persona) = self.find(&canonical) {
                return Ok(persona);
            }
        }

        let _guard = self.load_lock.lock().await;
        if let Some(persona) = self.find(&canonical) {
            return Ok(persona);
        }

        let persona = match self.store.load_persona(&canonical).await? {
            Some(record) if record.address == canonical => {
                debug!(persona = %canonical, buddies = record.roster.len(), "Persona restored");
                Persona::from_record(record, Arc::clone(&self.settings))
            }
            Some(record) => {
                warn!(
                    persona = %canonical,
                    stored = %record.address,
                    "Stored persona has a different address, starting fresh"
                );
                Persona::new(canonical.clone(), Arc::clone(&self.settings))
            }
            None => Persona::new(canonical.clone(), Arc::clone(&self.settings)),
        };

        let persona = Arc::new(Mutex::new(persona));
        self.personas.insert(canonical.clone(), Arc::clone(&persona));
        metrics::set_personas_loaded(self.personas.len());
        info!(persona = %canonical, "Persona loaded");
        Ok(persona)
    }

    /// Drop a persona from the cache. Its next use reloads it from the store.
    ///
    /// Open chats are not saved here; see `Switchboard::evict`.
    pub(crate) fn remove(&self, address: &Address) -> Option<PersonaRef> {
        let removed = self.personas.remove(address).map(|(_, p)| p);
        if removed.is_some() {
            metrics::set_personas_loaded(self.personas.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.personas.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of every loaded persona.
    pub fn personas(&self) -> Vec<PersonaRef> {
        self.personas.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::StaticDirectory;
    use crate::store::{MemoryStore, PersonaRecord};
    use parley_proto::{Presence, Show};

    fn registry(store: Arc<MemoryStore>, directory: StaticDirectory) -> PersonaRegistry {
        PersonaRegistry::new(
            Arc::new(directory),
            store,
            Arc::new(PersonaSettings::default()),
        )
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn loads_once_and_caches() {
        let reg = registry(Arc::new(MemoryStore::new()), StaticDirectory::new());
        let a = reg.get_or_load(&addr("alice@example.com")).await.unwrap();
        let b = reg.get_or_load(&addr("alice@example.com")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn alias_shares_the_canonical_persona() {
        let directory =
            StaticDirectory::new().with_alias(addr("al@example.com"), addr("alice@example.com"));
        let reg = registry(Arc::new(MemoryStore::new()), directory);

        let via_alias = reg.get_or_load(&addr("al@example.com")).await.unwrap();
        let direct = reg.get_or_load(&addr("alice@example.com")).await.unwrap();
        assert!(Arc::ptr_eq(&via_alias, &direct));
        assert_eq!(reg.addresses(), vec![addr("alice@example.com")]);
        assert_eq!(via_alias.lock().await.address().as_str(), "alice@example.com");
    }

    #[tokio::test]
    async fn restores_saved_configuration() {
        let store = Arc::new(MemoryStore::new());
        store.insert_persona(PersonaRecord {
            address: addr("alice@example.com"),
            presence: Presence::new(Show::Dnd, 3),
            roster: vec![],
        });
        let reg = registry(Arc::clone(&store), StaticDirectory::new());
        let alice = reg.get_or_load(&addr("alice@example.com")).await.unwrap();
        assert_eq!(alice.lock().await.presence().show, Show::Dnd);
    }

    #[tokio::test]
    async fn concurrent_first_loads_share_one_persona() {
        let reg = Arc::new(registry(Arc::new(MemoryStore::new()), StaticDirectory::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                tokio::spawn(async move { reg.get_or_load(&addr("bob@example.com")).await.unwrap() })
            })
            .collect();
        let mut loaded = Vec::new();
        for handle in handles {
            loaded.push(handle.await.unwrap());
        }
        assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn removed_persona_is_reloaded() {
        let reg = registry(Arc::new(MemoryStore::new()), StaticDirectory::new());
        let first = reg.get_or_load(&addr("alice@example.com")).await.unwrap();
        assert!(reg.remove(&addr("alice@example.com")).is_some());
        assert!(reg.find(&addr("alice@example.com")).is_none());
        let second = reg.get_or_load(&addr("alice@example.com")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn alias_answers_are_remembered() {
        let directory =
            StaticDirectory::new().with_alias(addr("al@example.com"), addr("alice@example.com"));
        let reg = registry(Arc::new(MemoryStore::new()), directory);

        assert_eq!(reg.canonical(&addr("al@example.com")).await, addr("alice@example.com"));
        assert_eq!(reg.canonical(&addr("bob@example.com")).await, addr("bob@example.com"));
        assert_eq!(reg.aliases.len(), 2);
        assert_eq!(reg.canonical(&addr("al@example.com")).await, addr("alice@example.com"));
        // Nothing is loaded by resolving.
        assert!(reg.is_empty());
    }
}
