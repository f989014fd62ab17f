// FORUM STATE: ROCKSDB STORE
// Production backend: one column family per record kind, one WriteBatch per commit.
//
// SAFETY INVARIANTS:
// 1. Every WriteSet becomes exactly one WriteBatch written with sync = true
// 2. The committed height travels in the same batch as the block's effects
// 3. A record that fails to decode is reported as Corrupt, never skipped

use crate::store::{ForumStore, StoreError, WriteOp, WriteSet};
use agora_core::{LedgerMessage, ModerationWordSet, User, ValidatorEntry};
use log::{debug, info};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

const CF_USERS: &str = "users";
const CF_MESSAGES: &str = "messages";
const CF_SENDER_INDEX: &str = "sender_index";
const CF_MODERATION: &str = "moderation";
const CF_VALIDATORS: &str = "validators";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_USERS,
    CF_MESSAGES,
    CF_SENDER_INDEX,
    CF_MODERATION,
    CF_VALIDATORS,
];

// Keys in the default column family
const META_COMMITTED_HEIGHT: &[u8] = b"committed_height";
const META_NEXT_SEQ: &[u8] = b"next_seq";

/// RocksDB tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDbConfig {
    /// Memtable size in bytes
    pub write_buffer_size: usize,

    /// Flush and compaction threads
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        RocksDbConfig {
            write_buffer_size: 64 * 1024 * 1024,
            max_background_jobs: 4,
        }
    }
}

pub struct RocksStore {
    db: DB,

    /// Serialises writers so next_seq is read and bumped consistently
    write_lock: Mutex<()>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_config(path, RocksDbConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: RocksDbConfig,
    ) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_background_jobs(config.max_background_jobs);

        let descriptors: Vec<_> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path.as_ref(), descriptors)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!("Opened forum store at {}", path.as_ref().display());
        Ok(RocksStore {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Unavailable(format!("Column family {} not found", name)))
    }

    fn get_meta_u64(&self, key: &[u8]) -> Result<u64, StoreError> {
        let raw = self
            .db
            .get(key)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        match raw {
            None => Ok(0),
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| StoreError::Corrupt {
                    key: String::from_utf8_lossy(key).into_owned(),
                    reason: format!("expected 8 bytes, got {}", bytes.len()),
                })?;
                Ok(u64::from_be_bytes(arr))
            }
        }
    }

    /// Decode every value in a column family whose key starts with `prefix`.
    fn scan<T: DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>, StoreError> {
        let cf = self.cf(cf_name)?;
        let mut out = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Unavailable(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(decode(cf_name, &key, &value)?);
        }
        Ok(out)
    }
}

fn decode<T: DeserializeOwned>(cf_name: &str, key: &[u8], bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt {
        key: format!("{}/{}", cf_name, String::from_utf8_lossy(key)),
        reason: e.to_string(),
    })
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Encoding(e.to_string()))
}

/// Length-prefixed sender, so "al" never prefix-matches "alice".
fn sender_prefix(sender: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + sender.len() + 8);
    key.extend_from_slice(&(sender.len() as u32).to_be_bytes());
    key.extend_from_slice(sender.as_bytes());
    key
}

fn sender_index_key(sender: &str, seq: u64) -> Vec<u8> {
    let mut key = sender_prefix(sender);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

impl ForumStore for RocksStore {
    fn find_user(&self, name: &str) -> Result<Option<User>, StoreError> {
        let cf = self.cf(CF_USERS)?;
        let raw = self
            .db
            .get_cf(cf, name.as_bytes())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        raw.map(|bytes| decode(CF_USERS, name.as_bytes(), &bytes))
            .transpose()
    }

    fn moderation_words(&self) -> Result<ModerationWordSet, StoreError> {
        let cf = self.cf(CF_MODERATION)?;
        let mut words = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let word = std::str::from_utf8(&key).map_err(|e| StoreError::Corrupt {
                key: format!("{}/{}", CF_MODERATION, String::from_utf8_lossy(&key)),
                reason: e.to_string(),
            })?;
            words.push(word.to_string());
        }
        Ok(ModerationWordSet::from_words(words))
    }

    fn history(&self) -> Result<Vec<LedgerMessage>, StoreError> {
        self.scan(CF_MESSAGES, &[])
    }

    fn messages_by_sender(&self, sender: &str) -> Result<Vec<LedgerMessage>, StoreError> {
        self.scan(CF_SENDER_INDEX, &sender_prefix(sender))
    }

    fn validators(&self) -> Result<Vec<ValidatorEntry>, StoreError> {
        self.scan(CF_VALIDATORS, &[])
    }

    fn committed_height(&self) -> Result<u64, StoreError> {
        self.get_meta_u64(META_COMMITTED_HEIGHT)
    }

    fn next_message_seq(&self) -> Result<u64, StoreError> {
        self.get_meta_u64(META_NEXT_SEQ)
    }

    fn write(&self, set: WriteSet) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let ops = set.len();
        let mut next_seq = self.get_meta_u64(META_NEXT_SEQ)?;
        let mut batch = WriteBatch::default();

        for op in set.into_ops() {
            match op {
                WriteOp::PutUser(user) => {
                    batch.put_cf(self.cf(CF_USERS)?, user.name.as_bytes(), encode(&user)?);
                }
                WriteOp::AppendMessage(msg) => {
                    if msg.seq < next_seq {
                        return Err(StoreError::Corrupt {
                            key: format!("{}/{}", CF_MESSAGES, msg.seq),
                            reason: format!("sequence already used, next is {}", next_seq),
                        });
                    }
                    let value = encode(&msg)?;
                    batch.put_cf(
                        self.cf(CF_SENDER_INDEX)?,
                        sender_index_key(&msg.sender, msg.seq),
                        &value,
                    );
                    batch.put_cf(self.cf(CF_MESSAGES)?, msg.seq.to_be_bytes(), value);
                    next_seq = msg.seq + 1;
                }
                WriteOp::AddModerationWords(words) => {
                    let cf = self.cf(CF_MODERATION)?;
                    for word in words.iter() {
                        batch.put_cf(cf, word.as_bytes(), b"");
                    }
                }
                WriteOp::PutValidator(entry) => {
                    batch.put_cf(
                        self.cf(CF_VALIDATORS)?,
                        entry.address.as_bytes(),
                        encode(&entry)?,
                    );
                }
                WriteOp::RemoveValidator(address) => {
                    batch.delete_cf(self.cf(CF_VALIDATORS)?, address.as_bytes());
                }
                WriteOp::SetCommittedHeight(height) => {
                    batch.put(META_COMMITTED_HEIGHT, height.to_be_bytes());
                }
            }
        }
        batch.put(META_NEXT_SEQ, next_seq.to_be_bytes());

        // Durability barrier
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db
            .write_opt(batch, &write_opts)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!("RocksDB store applied {} ops", ops);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use agora_core::Message;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RocksStore) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_empty_store_reads() {
        let (_dir, store) = open_temp();
        conformance::empty_store_reads(&store);
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, store) = open_temp();
        conformance::write_then_read(&store);
    }

    #[test]
    fn test_sender_prefixes_do_not_collide() {
        let (_dir, store) = open_temp();
        conformance::sender_prefixes_do_not_collide(&store);
    }

    #[test]
    fn test_validator_put_and_remove() {
        let (_dir, store) = open_temp();
        conformance::validator_put_and_remove(&store);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            let mut set = WriteSet::new();
            set.put_user(User::new_banned("bob"));
            set.append_message(LedgerMessage::new(0, Message::new("alice", "hello")));
            set.add_moderation_words(ModerationWordSet::starter());
            set.set_committed_height(7);
            store.write(set).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.committed_height().unwrap(), 7);
        assert_eq!(store.next_message_seq().unwrap(), 1);
        assert!(store.find_user("bob").unwrap().unwrap().banned);
        assert_eq!(store.history().unwrap()[0].body, "hello");
        assert_eq!(store.moderation_words().unwrap(), ModerationWordSet::starter());
    }

    #[test]
    fn test_reused_sequence_rejects_whole_set() {
        let (_dir, store) = open_temp();
        let mut set = WriteSet::new();
        set.append_message(LedgerMessage::new(0, Message::new("alice", "one")));
        store.write(set).unwrap();

        let mut set = WriteSet::new();
        set.put_user(User::new("carol"));
        set.append_message(LedgerMessage::new(0, Message::new("alice", "dup")));
        assert!(matches!(store.write(set), Err(StoreError::Corrupt { .. })));
        assert_eq!(store.find_user("carol").unwrap(), None);
        assert_eq!(store.history().unwrap().len(), 1);
    }

    #[test]
    fn test_custom_config_opens() {
        let dir = TempDir::new().unwrap();
        let config = RocksDbConfig {
            write_buffer_size: 4 * 1024 * 1024,
            max_background_jobs: 2,
        };
        let store = RocksStore::open_with_config(dir.path(), config).unwrap();
        conformance::empty_store_reads(&store);
    }
}
