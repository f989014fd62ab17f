// FORUM CONSENSUS: PROPOSAL BUILDER
// Turns the proposer's candidate pool into an ordered block: bans first, then clean posts.
//
// SAFETY INVARIANTS:
// 1. Output is a pure function of (candidates, effective word set); input order is preserved
// 2. Every ban directive precedes every post in the output
// 3. No post from a sender banned in this proposal survives, whatever its position
// 4. Unparsable candidates are dropped, never passed through
// 5. Nothing durable is mutated

use agora_core::{BanDirective, ForumError, Message, ModerationWordSet};
use agora_state::ForumStore;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct ProposalBuilder {
    store: Arc<dyn ForumStore>,
}

impl ProposalBuilder {
    pub fn new(store: Arc<dyn ForumStore>) -> Self {
        ProposalBuilder { store }
    }

    /// Build the proposal for `candidates` given this round's ratified words.
    pub fn build(
        &self,
        candidates: &[Vec<u8>],
        ratified: &ModerationWordSet,
    ) -> Result<Vec<Vec<u8>>, ForumError> {
        // Fail open: a missing durable set must not stall the chain
        let durable = match self.store.moderation_words() {
            Ok(words) => words,
            Err(e) => {
                warn!("Moderation words unavailable, proposing with ratified words only: {}", e);
                ModerationWordSet::new()
            }
        };
        let effective = durable.union(ratified);
        build_proposal(candidates, &effective)
    }
}

/// Partition `candidates` against `words` into the ordered proposal.
pub fn build_proposal(
    candidates: &[Vec<u8>],
    words: &ModerationWordSet,
) -> Result<Vec<Vec<u8>>, ForumError> {
    let mut bans: Vec<BanDirective> = Vec::new();
    let mut banned: BTreeSet<String> = BTreeSet::new();
    let mut posts: Vec<(&[u8], Message)> = Vec::new();
    let mut dropped = 0usize;

    for raw in candidates {
        let msg = match Message::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropping candidate: {}", e);
                dropped += 1;
                continue;
            }
        };
        if let Some(word) = words.find_match(&msg.body) {
            if banned.insert(msg.sender.clone()) {
                info!("Proposing ban of {} for word {:?}", msg.sender, word);
                bans.push(BanDirective::new(msg.sender));
            }
        } else {
            posts.push((raw.as_slice(), msg));
        }
    }

    let mut out = Vec::with_capacity(bans.len() + posts.len());
    for ban in &bans {
        out.push(ban.encode()?);
    }
    for (raw, msg) in posts {
        if banned.contains(&msg.sender) {
            dropped += 1;
            continue;
        }
        out.push(raw.to_vec());
    }

    info!(
        "Built proposal: {} bans, {} posts, {} dropped",
        bans.len(),
        out.len() - bans.len(),
        dropped
    );
    Ok(out)
}
