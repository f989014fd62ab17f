//! Consensus-facing decision logic of the forum ledger.
//!
//! Every component here is deterministic: given the same inputs, every
//! replica admits, proposes, verifies and commits identically.

pub mod admission;
pub mod commit;
pub mod proposal_builder;
pub mod proposal_verifier;
pub mod staging;
pub mod validator_registry;
pub mod vote_extension;

pub use admission::AdmissionChecker;
pub use commit::{CommitApplier, CommitError, CommitOutcome};
pub use proposal_builder::{build_proposal, ProposalBuilder};
pub use proposal_verifier::{verify_proposal, ProposalSummary};
pub use staging::{StagedBatch, StagingBuffer, TxOutcome};
pub use validator_registry::{RegistryError, ValidatorRegistry};
pub use vote_extension::{
    extension_payload, ExtensionError, VoteExtension, VoteExtensionAggregator, WordTally,
};
