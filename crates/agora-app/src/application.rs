// FORUM APPLICATION: HOST CALLBACK SURFACE
// The calls a consensus host makes into the application, one per consensus step.
//
// SAFETY INVARIANTS:
// 1. init_chain, prepare/process_proposal, finalize_block and commit arrive strictly
//    in sequence, one block at a time
// 2. check_tx and query may arrive concurrently with any of the above
// 3. Once a call reports Halted, every later consensus call does too

use crate::abci::*;
use agora_core::ForumError;
use agora_state::StoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Application halted after a fatal error; restart required")]
    Halted,

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Consensus(#[from] ForumError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub trait Application: Send + Sync {
    fn info(&self, req: RequestInfo) -> Result<ResponseInfo, AppError>;

    fn init_chain(&self, req: RequestInitChain) -> Result<ResponseInitChain, AppError>;

    fn check_tx(&self, req: RequestCheckTx) -> Result<ResponseCheckTx, AppError>;

    fn prepare_proposal(
        &self,
        req: RequestPrepareProposal,
    ) -> Result<ResponsePrepareProposal, AppError>;

    fn process_proposal(
        &self,
        req: RequestProcessProposal,
    ) -> Result<ResponseProcessProposal, AppError>;

    fn finalize_block(&self, req: RequestFinalizeBlock) -> Result<ResponseFinalizeBlock, AppError>;

    fn commit(&self) -> Result<ResponseCommit, AppError>;

    fn extend_vote(&self, req: RequestExtendVote) -> Result<ResponseExtendVote, AppError>;

    fn verify_vote_extension(
        &self,
        req: RequestVerifyVoteExtension,
    ) -> Result<ResponseVerifyVoteExtension, AppError>;

    fn query(&self, req: RequestQuery) -> Result<ResponseQuery, AppError>;

    // State sync is not supported; the defaults decline every snapshot.

    fn list_snapshots(&self) -> ResponseListSnapshots {
        ResponseListSnapshots::default()
    }

    fn offer_snapshot(&self, _req: RequestOfferSnapshot) -> ResponseOfferSnapshot {
        ResponseOfferSnapshot::default()
    }

    fn load_snapshot_chunk(&self, _req: RequestLoadSnapshotChunk) -> ResponseLoadSnapshotChunk {
        ResponseLoadSnapshotChunk::default()
    }

    fn apply_snapshot_chunk(&self, _req: RequestApplySnapshotChunk) -> ResponseApplySnapshotChunk {
        ResponseApplySnapshotChunk::default()
    }
}
