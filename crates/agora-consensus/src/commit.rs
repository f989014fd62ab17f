// FORUM CONSENSUS: COMMIT APPLIER
// Replays a staged batch against the store: bans, then posts, then one durable write.
//
// SAFETY INVARIANTS:
// 1. Bans are applied before posts, so a same-block ban already holds when posts land
// 2. Banning an already-banned user changes nothing and is not an error
// 3. A post from a banned sender is never recorded
// 4. The block's effects and its height go out in one WriteSet; a height at or
//    below the committed height is a replay and writes nothing
// 5. Any store failure is returned as fatal; nothing is skipped silently

use crate::staging::StagedBatch;
use agora_core::{LedgerMessage, User};
use agora_state::{ForumStore, StoreError, WriteSet};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("Commit of height {height} failed: {source}")]
    Store { height: u64, source: StoreError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Effects written and made durable
    Applied {
        height: u64,
        bans: usize,
        posts: usize,
        skipped: usize,
    },

    /// Height already committed; nothing written
    Replayed { height: u64 },
}

pub struct CommitApplier {
    store: Arc<dyn ForumStore>,
}

/// Users touched by the block, layered over the store.
struct UserOverlay<'a> {
    store: &'a dyn ForumStore,
    users: BTreeMap<String, User>,
    dirty: Vec<String>,
}

impl<'a> UserOverlay<'a> {
    fn new(store: &'a dyn ForumStore) -> Self {
        UserOverlay {
            store,
            users: BTreeMap::new(),
            dirty: Vec::new(),
        }
    }

    fn get(&mut self, name: &str) -> Result<Option<&mut User>, StoreError> {
        if !self.users.contains_key(name) {
            match self.store.find_user(name)? {
                Some(user) => {
                    self.users.insert(name.to_string(), user);
                }
                None => return Ok(None),
            }
        }
        Ok(self.users.get_mut(name))
    }

    fn insert(&mut self, user: User) {
        self.mark(&user.name);
        self.users.insert(user.name.clone(), user);
    }

    fn mark(&mut self, name: &str) {
        if !self.dirty.iter().any(|n| n == name) {
            self.dirty.push(name.to_string());
        }
    }

    fn flush_into(mut self, writes: &mut WriteSet) {
        for name in self.dirty {
            if let Some(user) = self.users.remove(&name) {
                writes.put_user(user);
            }
        }
    }
}

impl CommitApplier {
    pub fn new(store: Arc<dyn ForumStore>) -> Self {
        CommitApplier { store }
    }

    /// Apply `batch` durably.
    ///
    /// SAFETY: An error means the agreed block is not on disk. The caller
    /// must stop participating in consensus.
    pub fn apply(&self, batch: StagedBatch) -> Result<CommitOutcome, CommitError> {
        let height = batch.height;
        let fail = |source: StoreError| CommitError::Store { height, source };

        let committed = self.store.committed_height().map_err(fail)?;
        if height <= committed {
            info!(
                "Height {} already committed (store at {}), skipping replay",
                height, committed
            );
            return Ok(CommitOutcome::Replayed { height });
        }

        let store: &dyn ForumStore = self.store.as_ref();
        let mut overlay = UserOverlay::new(store);
        let mut writes = WriteSet::new();

        // Phase 1: bans
        for ban in &batch.bans {
            let changed = match overlay.get(&ban.target).map_err(fail)? {
                Some(user) => user.ban(),
                None => {
                    overlay.insert(User::new_banned(ban.target.clone()));
                    info!("Created banned user {}", ban.target);
                    continue;
                }
            };
            if changed {
                overlay.mark(&ban.target);
                info!("Banned user {}", ban.target);
            } else {
                debug!("User {} already banned", ban.target);
            }
        }

        // Phase 2: posts
        let mut seq = store.next_message_seq().map_err(fail)?;
        let mut posts = 0usize;
        let mut skipped = 0usize;
        for msg in batch.posts {
            match overlay.get(&msg.sender).map_err(fail)? {
                Some(user) if user.banned => {
                    warn!("Dropping post from banned user {}", msg.sender);
                    skipped += 1;
                    continue;
                }
                Some(_) => {}
                None => overlay.insert(User::new(msg.sender.clone())),
            }
            writes.append_message(LedgerMessage::new(seq, msg));
            seq += 1;
            posts += 1;
        }

        let bans = batch.bans.len();
        overlay.flush_into(&mut writes);
        writes.set_committed_height(height);

        // Phase 3: durability barrier
        store.write(writes).map_err(fail)?;

        info!(
            "Committed height {}: {} bans, {} posts, {} skipped",
            height, bans, posts, skipped
        );
        Ok(CommitOutcome::Applied {
            height,
            bans,
            posts,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{BanDirective, Message};
    use agora_state::MemoryStore;

    fn batch(height: u64, bans: &[&str], posts: &[(&str, &str)]) -> StagedBatch {
        StagedBatch {
            height,
            bans: bans.iter().map(|t| BanDirective::new(*t)).collect(),
            posts: posts.iter().map(|(s, b)| Message::new(*s, *b)).collect(),
        }
    }

    fn setup() -> (Arc<MemoryStore>, CommitApplier) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), CommitApplier::new(store))
    }

    #[test_log::test]
    fn test_bans_then_posts() {
        let (store, applier) = setup();
        let outcome = applier
            .apply(batch(1, &["bob"], &[("alice", "hello"), ("bob", "sneaky")]))
            .unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Applied {
                height: 1,
                bans: 1,
                posts: 1,
                skipped: 1
            }
        );
        assert!(store.find_user("bob").unwrap().unwrap().banned);
        assert!(!store.find_user("alice").unwrap().unwrap().banned);
        let history = store.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sender, "alice");
        assert_eq!(store.committed_height().unwrap(), 1);
    }

    #[test]
    fn test_ban_is_idempotent() {
        let (store, applier) = setup();
        applier.apply(batch(1, &["bob"], &[])).unwrap();
        applier.apply(batch(2, &["bob"], &[])).unwrap();
        let bob = store.find_user("bob").unwrap().unwrap();
        assert!(bob.banned);
        assert_eq!(bob, User::new_banned("bob"));
    }

    #[test]
    fn test_existing_user_gets_banned() {
        let (store, applier) = setup();
        applier.apply(batch(1, &[], &[("carol", "first")])).unwrap();
        applier.apply(batch(2, &["carol"], &[("carol", "second")])).unwrap();
        assert!(store.find_user("carol").unwrap().unwrap().banned);
        assert_eq!(store.messages_by_sender("carol").unwrap().len(), 1);
    }

    #[test]
    fn test_replay_writes_nothing() {
        let (store, applier) = setup();
        let b = batch(4, &[], &[("alice", "once")]);
        applier.apply(b.clone()).unwrap();
        assert_eq!(
            applier.apply(b).unwrap(),
            CommitOutcome::Replayed { height: 4 }
        );
        assert_eq!(store.history().unwrap().len(), 1);
    }

    #[test]
    fn test_sequence_continues_across_blocks() {
        let (store, applier) = setup();
        applier.apply(batch(1, &[], &[("a", "1"), ("b", "2")])).unwrap();
        applier.apply(batch(2, &[], &[("a", "3")])).unwrap();
        let seqs: Vec<_> = store.history().unwrap().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_store_failure_is_reported() {
        let (store, applier) = setup();
        store.set_unavailable(true);
        let err = applier.apply(batch(1, &["bob"], &[])).unwrap_err();
        assert!(matches!(err, CommitError::Store { height: 1, .. }));
        store.set_unavailable(false);
        assert_eq!(store.committed_height().unwrap(), 0);
    }
}
