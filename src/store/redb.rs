//! Redb-backed persistent store.
//!
//! Implements [`ChatStore`] on the redb embedded database. Transcripts are
//! keyed by a numeric handle drawn from a counter in the meta table; persona
//! records are keyed by their address.

use super::{ChatHandle, ChatStore, PersonaRecord, StoreError, Transcript};
use async_trait::async_trait;
use parley_proto::Address;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;

const TRANSCRIPTS: TableDefinition<u64, &[u8]> = TableDefinition::new("transcripts");
const PERSONAS: TableDefinition<&str, &[u8]> = TableDefinition::new("personas");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_HANDLE: &str = "next_handle";

pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Read a saved transcript back.
    pub fn transcript(&self, handle: ChatHandle) -> Result<Option<Transcript>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let table = match read_txn.open_table(TRANSCRIPTS) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StoreError::Database(e.to_string())),
        };
        let Some(value) = table
            .get(handle.0)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };
        let transcript = serde_json::from_slice(value.value())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(transcript))
    }
}

#[async_trait]
impl ChatStore for RedbStore {
    async fn flush_chat(
        &self,
        prior: Option<ChatHandle>,
        transcript: &Transcript,
    ) -> Result<ChatHandle, StoreError> {
        let value = serde_json::to_vec(transcript)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let handle = {
            let mut table = write_txn
                .open_table(TRANSCRIPTS)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let existing = match prior {
                Some(handle) => {
                    let found = table
                        .get(handle.0)
                        .map_err(|e| StoreError::Database(e.to_string()))?
                        .is_some();
                    if !found {
                        tracing::warn!(
                            handle = %handle,
                            thread = %transcript.thread_id,
                            "Saved transcript is gone, creating a new one"
                        );
                    }
                    found.then_some(handle)
                }
                None => None,
            };

            let handle = match existing {
                Some(handle) => handle,
                None => {
                    let mut meta = write_txn
                        .open_table(META)
                        .map_err(|e| StoreError::Database(e.to_string()))?;
                    let next = meta
                        .get(NEXT_HANDLE)
                        .map_err(|e| StoreError::Database(e.to_string()))?
                        .map(|v| v.value())
                        .unwrap_or(0)
                        + 1;
                    meta.insert(NEXT_HANDLE, next)
                        .map_err(|e| StoreError::Database(e.to_string()))?;
                    ChatHandle(next)
                }
            };

            table
                .insert(handle.0, value.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
            handle
        };
        write_txn
            .commit()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(handle)
    }

    async fn load_persona(&self, address: &Address) -> Result<Option<PersonaRecord>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let table = match read_txn.open_table(PERSONAS) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StoreError::Database(e.to_string())),
        };
        let Some(value) = table
            .get(address.as_str())
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };
        let record = serde_json::from_slice(value.value())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(record))
    }

    async fn save_persona(&self, record: &PersonaRecord) -> Result<(), StoreError> {
        let value =
            serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(PERSONAS)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            table
                .insert(record.address.as_str(), value.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use parley_proto::{Presence, Show};
    use tempfile::tempdir;

    fn transcript(body: &str) -> Transcript {
        let owner: Address = "alice@example.com".parse().unwrap();
        Transcript {
            owner: owner.clone(),
            thread_id: "t1".into(),
            multi_user: false,
            room: None,
            participants: vec![owner.clone()],
            first_seq: 0,
            messages: vec![ChatMessage {
                seq: 1,
                from: Some(owner),
                nick: None,
                to: None,
                subject: None,
                body: body.into(),
                timestamp: 0,
            }],
            flushed_at: 0,
        }
    }

    #[tokio::test]
    async fn flush_overwrites_prior_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parley.db");
        let store = RedbStore::new(path.to_str().unwrap()).unwrap();

        let first = store.flush_chat(None, &transcript("one")).await.unwrap();
        let second = store
            .flush_chat(Some(first), &transcript("two"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let saved = store.transcript(first).unwrap().unwrap();
        assert_eq!(saved.messages[0].body, "two");
    }

    #[tokio::test]
    async fn stale_handle_gets_a_new_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parley.db");
        let store = RedbStore::new(path.to_str().unwrap()).unwrap();

        let handle = store
            .flush_chat(Some(ChatHandle(42)), &transcript("hello"))
            .await
            .unwrap();
        assert_ne!(handle, ChatHandle(42));
        assert!(store.transcript(handle).unwrap().is_some());
    }

    #[tokio::test]
    async fn persona_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parley.db");
        let store = RedbStore::new(path.to_str().unwrap()).unwrap();
        let address: Address = "alice@example.com".parse().unwrap();

        assert!(store.load_persona(&address).await.unwrap().is_none());

        let record = PersonaRecord {
            address: address.clone(),
            presence: Presence::new(Show::Dnd, 5).with_status("busy"),
            roster: vec![],
        };
        store.save_persona(&record).await.unwrap();
        assert_eq!(store.load_persona(&address).await.unwrap(), Some(record));
    }
}
