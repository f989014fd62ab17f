// FORUM CONSENSUS: PROPOSAL VERIFIER
// Independent re-check of a peer's proposal, run by every replica.
//
// SAFETY INVARIANTS:
// 1. Single forward scan; once a post is seen, any later ban rejects the proposal
// 2. Any transaction that decodes as neither kind rejects the proposal
// 3. A post from a sender banned earlier in the same proposal rejects it
// 4. Pure predicate: no store access, no mutation

use agora_core::{ForumError, Transaction};
use log::warn;
use std::collections::BTreeSet;

/// Counts of an accepted proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProposalSummary {
    pub bans: usize,
    pub posts: usize,
}

pub fn verify_proposal(txs: &[Vec<u8>]) -> Result<ProposalSummary, ForumError> {
    let mut summary = ProposalSummary::default();
    let mut seen_post = false;
    let mut banned: BTreeSet<String> = BTreeSet::new();

    for (i, raw) in txs.iter().enumerate() {
        let tx = Transaction::decode(raw).map_err(|e| {
            reject(format!("transaction {} does not decode: {}", i, e))
        })?;
        match tx {
            Transaction::Ban(ban) => {
                if seen_post {
                    return Err(reject(format!(
                        "ban of {} at position {} follows a post",
                        ban.target, i
                    )));
                }
                banned.insert(ban.target);
                summary.bans += 1;
            }
            Transaction::Post(msg) => {
                seen_post = true;
                if banned.contains(&msg.sender) {
                    return Err(reject(format!(
                        "post at position {} from {} who is banned in this block",
                        i, msg.sender
                    )));
                }
                summary.posts += 1;
            }
        }
    }
    Ok(summary)
}

fn reject(reason: String) -> ForumError {
    warn!("Rejecting proposal: {}", reason);
    ForumError::ConsensusInvariantViolated(reason)
}
