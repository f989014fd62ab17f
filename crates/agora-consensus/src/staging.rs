// FORUM CONSENSUS: STAGING BUFFER
// Holds a finalized block's accepted effects until Commit makes them durable.
//
// SAFETY INVARIANTS:
// 1. At most one height is staged at a time
// 2. Re-finalizing the staged height rebuilds the batch from scratch (replay after crash)
// 3. Finalizing a new height while another is staged is an invariant violation
// 4. Nothing here is persisted; the host replays Finalize before Commit after a crash

use agora_core::{BanDirective, ForumError, Message, ResponseCode, Transaction};
use log::{debug, info, warn};

/// Accepted effects of one finalized block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedBatch {
    pub height: u64,
    pub bans: Vec<BanDirective>,
    pub posts: Vec<Message>,
}

/// Result of one transaction of a finalized block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub code: ResponseCode,
    pub log: String,
}

impl TxOutcome {
    fn ok(kind: &str) -> Self {
        TxOutcome {
            code: ResponseCode::Ok,
            log: format!("staged {}", kind),
        }
    }
}

#[derive(Debug, Default)]
pub struct StagingBuffer {
    staged: Option<StagedBatch>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and stage every transaction of the block at `height`.
    pub fn stage(&mut self, height: u64, txs: &[Vec<u8>]) -> Result<Vec<TxOutcome>, ForumError> {
        match &self.staged {
            Some(batch) if batch.height != height => {
                return Err(ForumError::ConsensusInvariantViolated(format!(
                    "finalize of height {} while height {} is still staged",
                    height, batch.height
                )));
            }
            Some(_) => info!("Re-staging height {} (replayed finalize)", height),
            None => {}
        }

        let mut batch = StagedBatch {
            height,
            ..StagedBatch::default()
        };
        let mut outcomes = Vec::with_capacity(txs.len());
        for (i, raw) in txs.iter().enumerate() {
            match Transaction::decode(raw) {
                Ok(Transaction::Ban(ban)) => {
                    batch.bans.push(ban);
                    outcomes.push(TxOutcome::ok("ban"));
                }
                Ok(Transaction::Post(msg)) => {
                    batch.posts.push(msg);
                    outcomes.push(TxOutcome::ok("post"));
                }
                Err(e) => {
                    warn!("Transaction {} of height {} not staged: {}", i, height, e);
                    outcomes.push(TxOutcome {
                        code: ResponseCode::EncodingError,
                        log: e.to_string(),
                    });
                }
            }
        }

        debug!(
            "Staged height {}: {} bans, {} posts",
            height,
            batch.bans.len(),
            batch.posts.len()
        );
        self.staged = Some(batch);
        Ok(outcomes)
    }

    /// The staged batch, if any, left in place.
    pub fn peek(&self) -> Option<&StagedBatch> {
        self.staged.as_ref()
    }

    /// Hand the staged batch to Commit.
    pub fn take(&mut self) -> Option<StagedBatch> {
        self.staged.take()
    }

    pub fn staged_height(&self) -> Option<u64> {
        self.staged.as_ref().map(|b| b.height)
    }
}
