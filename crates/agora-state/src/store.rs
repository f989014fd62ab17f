// FORUM STATE: STORE CONTRACT
// What the consensus core needs from durable storage, and nothing more.
//
// SAFETY INVARIANTS:
// 1. A WriteSet is applied all-or-nothing; readers never see half of one
// 2. A successful write() is durable (the durability barrier of a commit)
// 3. Lookups of absent records return Ok(None)/empty, never an error

use agora_core::{
    ForumError, LedgerMessage, ModerationWordSet, User, ValidatorAddress, ValidatorEntry,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record under {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Failed to encode record: {0}")]
    Encoding(String),
}

impl From<StoreError> for ForumError {
    fn from(err: StoreError) -> Self {
        ForumError::StoreUnavailable(err.to_string())
    }
}

/// A single state mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or replace a user record
    PutUser(User),

    /// Append a committed post; its `seq` must be unused
    AppendMessage(LedgerMessage),

    /// Union words into the moderation set
    AddModerationWords(ModerationWordSet),

    /// Insert or replace a validator
    PutValidator(ValidatorEntry),

    /// Forget a validator
    RemoveValidator(ValidatorAddress),

    /// Record the height whose effects this write completes
    SetCommittedHeight(u64),
}

/// Ordered batch of mutations applied as one atomic, durable write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    ops: Vec<WriteOp>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn put_user(&mut self, user: User) {
        self.push(WriteOp::PutUser(user));
    }

    pub fn append_message(&mut self, msg: LedgerMessage) {
        self.push(WriteOp::AppendMessage(msg));
    }

    pub fn add_moderation_words(&mut self, words: ModerationWordSet) {
        self.push(WriteOp::AddModerationWords(words));
    }

    pub fn put_validator(&mut self, entry: ValidatorEntry) {
        self.push(WriteOp::PutValidator(entry));
    }

    pub fn remove_validator(&mut self, address: ValidatorAddress) {
        self.push(WriteOp::RemoveValidator(address));
    }

    pub fn set_committed_height(&mut self, height: u64) {
        self.push(WriteOp::SetCommittedHeight(height));
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Durable key-value storage consumed by the consensus core.
///
/// Implementations are shared between the consensus path and concurrent
/// query/mempool callers, hence `Send + Sync` and `&self` everywhere.
pub trait ForumStore: Send + Sync {
    fn find_user(&self, name: &str) -> Result<Option<User>, StoreError>;

    fn moderation_words(&self) -> Result<ModerationWordSet, StoreError>;

    /// All committed posts in insertion order.
    fn history(&self) -> Result<Vec<LedgerMessage>, StoreError>;

    /// Committed posts of one sender in insertion order.
    fn messages_by_sender(&self, sender: &str) -> Result<Vec<LedgerMessage>, StoreError>;

    fn validators(&self) -> Result<Vec<ValidatorEntry>, StoreError>;

    /// Height of the last fully applied block; 0 before the first commit.
    fn committed_height(&self) -> Result<u64, StoreError>;

    /// Ordinal the next appended post must use.
    fn next_message_seq(&self) -> Result<u64, StoreError>;

    /// Apply every op of `set` atomically, then make it durable.
    fn write(&self, set: WriteSet) -> Result<(), StoreError>;
}
