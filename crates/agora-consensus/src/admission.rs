// FORUM CONSENSUS: ADMISSION CHECKER
// Gate in front of the unconfirmed pool.
//
// SAFETY INVARIANTS:
// 1. Admission never mutates state and is safe to re-run at any time
// 2. Unseen senders are admitted; only a committed ban keeps a sender out

use agora_core::{ForumError, Message};
use agora_state::ForumStore;
use log::debug;
use std::sync::Arc;

pub struct AdmissionChecker {
    store: Arc<dyn ForumStore>,
}

impl AdmissionChecker {
    pub fn new(store: Arc<dyn ForumStore>) -> Self {
        AdmissionChecker { store }
    }

    /// Accept a raw post for the pool, returning it decoded.
    pub fn check(&self, raw: &[u8]) -> Result<Message, ForumError> {
        let msg = Message::parse(raw)?;
        match self.store.find_user(&msg.sender)? {
            Some(user) if user.banned => {
                debug!("Refusing post from banned sender {}", msg.sender);
                Err(ForumError::Banned(msg.sender))
            }
            _ => Ok(msg),
        }
    }
}
