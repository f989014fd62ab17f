// FORUM STATE: IN-MEMORY STORE
// Process-local backend for tests and ephemeral nodes.
//
// SAFETY INVARIANTS:
// 1. A WriteSet is applied under a single write lock, so readers see all of it or none
// 2. Messages are kept in append order; the sender index is derived, never stored twice

use crate::store::{ForumStore, StoreError, WriteOp, WriteSet};
use agora_core::{LedgerMessage, ModerationWordSet, User, ValidatorAddress, ValidatorEntry};
use log::debug;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<String, User>,
    messages: Vec<LedgerMessage>,
    words: ModerationWordSet,
    validators: BTreeMap<ValidatorAddress, ValidatorEntry>,
    committed_height: u64,
    next_seq: u64,
}

/// Store that keeps everything in a lock-guarded map.
///
/// "Durable" here means "visible to every later reader of this process".
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl ForumStore for MemoryStore {
    fn find_user(&self, name: &str) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        Ok(self.state.read().users.get(name).cloned())
    }

    fn moderation_words(&self) -> Result<ModerationWordSet, StoreError> {
        self.check_available()?;
        Ok(self.state.read().words.clone())
    }

    fn history(&self) -> Result<Vec<LedgerMessage>, StoreError> {
        self.check_available()?;
        Ok(self.state.read().messages.clone())
    }

    fn messages_by_sender(&self, sender: &str) -> Result<Vec<LedgerMessage>, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .messages
            .iter()
            .filter(|m| m.sender == sender)
            .cloned()
            .collect())
    }

    fn validators(&self) -> Result<Vec<ValidatorEntry>, StoreError> {
        self.check_available()?;
        Ok(self.state.read().validators.values().cloned().collect())
    }

    fn committed_height(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.state.read().committed_height)
    }

    fn next_message_seq(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.state.read().next_seq)
    }

    fn write(&self, set: WriteSet) -> Result<(), StoreError> {
        self.check_available()?;
        let ops = set.len();
        let mut state = self.state.write();

        // Validate first so a bad op leaves the state untouched
        let mut expected_seq = state.next_seq;
        for op in set.ops() {
            if let WriteOp::AppendMessage(msg) = op {
                if msg.seq < expected_seq {
                    return Err(StoreError::Corrupt {
                        key: format!("message/{}", msg.seq),
                        reason: format!("sequence already used, next is {}", expected_seq),
                    });
                }
                expected_seq = msg.seq + 1;
            }
        }

        for op in set.into_ops() {
            match op {
                WriteOp::PutUser(user) => {
                    state.users.insert(user.name.clone(), user);
                }
                WriteOp::AppendMessage(msg) => {
                    state.next_seq = msg.seq + 1;
                    state.messages.push(msg);
                }
                WriteOp::AddModerationWords(words) => state.words.extend(&words),
                WriteOp::PutValidator(entry) => {
                    state.validators.insert(entry.address, entry);
                }
                WriteOp::RemoveValidator(address) => {
                    state.validators.remove(&address);
                }
                WriteOp::SetCommittedHeight(height) => state.committed_height = height,
            }
        }
        debug!("Memory store applied {} ops", ops);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use agora_core::Message;

    #[test]
    fn test_empty_store_reads() {
        conformance::empty_store_reads(&MemoryStore::new());
    }

    #[test]
    fn test_write_then_read() {
        conformance::write_then_read(&MemoryStore::new());
    }

    #[test]
    fn test_sender_prefixes_do_not_collide() {
        conformance::sender_prefixes_do_not_collide(&MemoryStore::new());
    }

    #[test]
    fn test_validator_put_and_remove() {
        conformance::validator_put_and_remove(&MemoryStore::new());
    }

    #[test]
    fn test_unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.find_user("alice"),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.write(WriteSet::new()).is_err());
        store.set_unavailable(false);
        assert_eq!(store.find_user("alice").unwrap(), None);
    }

    #[test]
    fn test_reused_sequence_rejects_whole_set() {
        let store = MemoryStore::new();
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
}
