// FORUM CONSENSUS: VOTE-EXTENSION AGGREGATOR
// Validators signal policy words in their vote extensions; a strict majority ratifies them.
//
// SAFETY INVARIANTS:
// 1. Each known validator counts at most once per word, however often it repeats it
// 2. Extensions from unknown signers are ignored, never fatal to the tally
// 3. A word is ratified iff its tally is strictly greater than floor(known / 2)
// 4. The tally is a pure function of its inputs; nothing durable is touched

use crate::validator_registry::ValidatorRegistry;
use agora_core::{ModerationWordSet, ValidatorAddress, MAX_EXTENSION_WORDS};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// One validator's extension as carried in the previous commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteExtension {
    /// Raw signer address as delivered by the host
    pub validator: Vec<u8>,
    pub payload: Vec<u8>,
}

impl VoteExtension {
    pub fn new(validator: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        VoteExtension {
            validator: validator.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("Extension signed by unknown validator {0}")]
    UnknownValidator(String),

    #[error("Extension payload is not UTF-8")]
    NotUtf8,

    #[error("Extension carries {got} words, limit is {max}")]
    TooManyWords { got: usize, max: usize },
}

/// Per-word vote counts for one proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordTally {
    /// floor(known validators / 2)
    pub threshold: usize,

    /// Distinct known validators that contributed
    pub voters: usize,

    pub counts: BTreeMap<String, usize>,
}

impl WordTally {
    /// Words whose count is strictly greater than the threshold.
    pub fn ratified(&self) -> ModerationWordSet {
        ModerationWordSet::from_words(
            self.counts
                .iter()
                .filter(|(_, count)| **count > self.threshold)
                .map(|(word, _)| word),
        )
    }
}

pub struct VoteExtensionAggregator {
    registry: Arc<ValidatorRegistry>,
}

impl VoteExtensionAggregator {
    pub fn new(registry: Arc<ValidatorRegistry>) -> Self {
        VoteExtensionAggregator { registry }
    }

    pub fn tally(&self, extensions: &[VoteExtension]) -> WordTally {
        let mut tally = WordTally {
            threshold: self.registry.len() / 2,
            ..WordTally::default()
        };
        let mut seen: BTreeSet<ValidatorAddress> = BTreeSet::new();

        for ext in extensions {
            let address = match ValidatorAddress::from_slice(&ext.validator) {
                Ok(a) if self.registry.is_known(&a) => a,
                _ => {
                    debug!(
                        "Ignoring extension from unknown signer {}",
                        hex::encode_upper(&ext.validator)
                    );
                    continue;
                }
            };
            if !seen.insert(address) {
                warn!("Validator {} delivered more than one extension", address);
                continue;
            }
            let payload = match std::str::from_utf8(&ext.payload) {
                Ok(p) => p,
                Err(_) => {
                    warn!("Ignoring non UTF-8 extension from {}", address);
                    continue;
                }
            };

            tally.voters += 1;
            for word in ModerationWordSet::from_payload(payload).iter() {
                *tally.counts.entry(word.clone()).or_insert(0) += 1;
            }
        }
        tally
    }

    /// Words ratified by the extensions of the previous commit.
    pub fn ratify(&self, extensions: &[VoteExtension]) -> ModerationWordSet {
        let tally = self.tally(extensions);
        let ratified = tally.ratified();
        info!(
            "Moderation tally: {} voters, threshold {}, ratified {}",
            tally.voters, tally.threshold, ratified
        );
        ratified
    }

    /// Check an extension received from a peer. The verdict depends only on
    /// the registry and the payload.
    pub fn verify(&self, validator: &[u8], payload: &[u8]) -> Result<(), ExtensionError> {
        if !self.registry.is_known_raw(validator) {
            return Err(ExtensionError::UnknownValidator(hex::encode_upper(validator)));
        }
        let payload = std::str::from_utf8(payload).map_err(|_| ExtensionError::NotUtf8)?;
        let words = ModerationWordSet::from_payload(payload);
        if words.len() > MAX_EXTENSION_WORDS {
            return Err(ExtensionError::TooManyWords {
                got: words.len(),
                max: MAX_EXTENSION_WORDS,
            });
        }
        Ok(())
    }
}

/// This replica's extension: its known words, delimiter-joined.
pub fn extension_payload(words: &ModerationWordSet) -> Vec<u8> {
    words.to_payload().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{PublicKey, ValidatorUpdate};
    use agora_state::WriteSet;
    use ed25519_dalek::SigningKey;

    fn registry_of(n: u8) -> (Arc<ValidatorRegistry>, Vec<Vec<u8>>) {
        let registry = Arc::new(ValidatorRegistry::new());
        let updates: Vec<_> = (1..=n)
            .map(|seed| {
                let key = SigningKey::from_bytes(&[seed; 32]).verifying_key().to_bytes();
                ValidatorUpdate::new(PublicKey::ed25519(key.to_vec()), 10)
            })
            .collect();
        registry.apply_updates(&updates, &mut WriteSet::new()).unwrap();
        let addresses = registry
            .entries()
            .iter()
            .map(|e| e.address.as_bytes().to_vec())
            .collect();
        (registry, addresses)
    }

    #[test]
    fn test_threshold_boundary() {
        let (registry, v) = registry_of(4);
        let agg = VoteExtensionAggregator::new(registry);

        let two = vec![
            VoteExtension::new(v[0].clone(), "x"),
            VoteExtension::new(v[1].clone(), "x"),
        ];
        let tally = agg.tally(&two);
        assert_eq!(tally.threshold, 2);
        assert_eq!(tally.counts["x"], 2);
        assert!(agg.ratify(&two).is_empty());

        let mut three = two.clone();
        three.push(VoteExtension::new(v[2].clone(), "x"));
        assert!(agg.ratify(&three).contains("x"));
    }

    #[test]
    fn test_repeats_do_not_inflate() {
        let (registry, v) = registry_of(3);
        let agg = VoteExtensionAggregator::new(registry);
        let exts = vec![
            VoteExtension::new(v[0].clone(), "spam|spam|spam"),
            VoteExtension::new(v[0].clone(), "spam"),
        ];
        let tally = agg.tally(&exts);
        assert_eq!(tally.voters, 1);
        assert_eq!(tally.counts["spam"], 1);
        assert!(tally.ratified().is_empty());
    }

    #[test]
    fn test_unknown_signers_ignored() {
        let (registry, v) = registry_of(3);
        let agg = VoteExtensionAggregator::new(registry);
        let exts = vec![
            VoteExtension::new(vec![0xAA; 20], "spam"),
            VoteExtension::new(vec![0xBB; 3], "spam"),
            VoteExtension::new(v[0].clone(), "spam"),
            VoteExtension::new(v[1].clone(), "spam|eggs"),
        ];
        let ratified = agg.ratify(&exts);
        assert!(ratified.contains("spam"));
        assert!(!ratified.contains("eggs"));
    }

    #[test]
    fn test_verify_extension() {
        let (registry, v) = registry_of(2);
        let agg = VoteExtensionAggregator::new(registry);
        assert!(agg.verify(&v[0], b"a|b").is_ok());
        assert!(matches!(
            agg.verify(&[1u8; 20], b"a"),
            Err(ExtensionError::UnknownValidator(_))
        ));
        assert_eq!(agg.verify(&v[0], &[0xff, 0xfe]), Err(ExtensionError::NotUtf8));
    }

    #[test]
    fn test_verify_word_limit() {
        let (registry, v) = registry_of(1);
        let agg = VoteExtensionAggregator::new(registry);
        let words = |n: usize| {
            let set = ModerationWordSet::from_words((0..n).map(|i| format!("w{}", i)));
            extension_payload(&set)
        };
        assert!(agg.verify(&v[0], &words(MAX_EXTENSION_WORDS)).is_ok());
        assert_eq!(
            agg.verify(&v[0], &words(MAX_EXTENSION_WORDS + 1)),
            Err(ExtensionError::TooManyWords {
                got: MAX_EXTENSION_WORDS + 1,
                max: MAX_EXTENSION_WORDS,
            })
        );
    }

    #[test]
    fn test_payload_is_sorted_and_joined() {
        let words = ModerationWordSet::from_words(["zed", "abc"]);
        assert_eq!(extension_payload(&words), b"abc|zed".to_vec());
    }
}
