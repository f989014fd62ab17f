// FORUM CONSENSUS: VALIDATOR REGISTRY
// Address -> key map of the validators this replica recognises.
//
// SAFETY INVARIANTS:
// 1. The registry is an explicit handle shared by reference, never ambient state
// 2. A batch of updates is decoded in full before any of it is applied
// 3. A key that fails to decode is fatal; the registry is never left partially updated
// 4. Reads may run concurrently with an update and see it entirely or not at all

use agora_core::{KeyError, ValidatorAddress, ValidatorEntry, ValidatorUpdate};
use agora_state::{ForumStore, StoreError, WriteSet};
use log::{info, warn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Validator key failed to decode: {0}")]
    KeyDecode(#[from] KeyError),

    #[error("Stored validator {stored} does not match its key (derived {derived})")]
    AddressMismatch {
        stored: ValidatorAddress,
        derived: ValidatorAddress,
    },

    #[error("Failed to load validators: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    validators: RwLock<BTreeMap<ValidatorAddress, ValidatorEntry>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a validator-set change and record it in `writes` for persistence.
    ///
    /// Power 0 removes the validator; any other power inserts or replaces it.
    ///
    /// SAFETY: Returns an error without touching the registry if any key in
    /// `updates` fails to decode. Callers must treat that as fatal.
    pub fn apply_updates(
        &self,
        updates: &[ValidatorUpdate],
        writes: &mut WriteSet,
    ) -> Result<(), RegistryError> {
        let decoded = updates
            .iter()
            .map(ValidatorEntry::from_update)
            .collect::<Result<Vec<_>, _>>()?;

        let mut validators = self.validators.write();
        for (update, entry) in updates.iter().zip(decoded) {
            if update.is_removal() {
                if validators.remove(&entry.address).is_none() {
                    warn!("Removal of unknown validator {}", entry.address);
                }
                writes.remove_validator(entry.address);
            } else {
                info!(
                    "Registering validator {} with power {}",
                    entry.address, entry.power
                );
                writes.put_validator(entry.clone());
                validators.insert(entry.address, entry);
            }
        }
        Ok(())
    }

    /// Rebuild the registry from persisted entries after a restart.
    ///
    /// SAFETY: Every stored key is decoded again and its address re-derived;
    /// a mismatch means the store cannot be trusted.
    pub fn reload(&self, store: &dyn ForumStore) -> Result<usize, RegistryError> {
        let mut loaded = BTreeMap::new();
        for stored in store.validators()? {
            let entry =
                ValidatorEntry::from_update(&ValidatorUpdate::new(stored.pub_key, stored.power))?;
            if entry.address != stored.address {
                return Err(RegistryError::AddressMismatch {
                    stored: stored.address,
                    derived: entry.address,
                });
            }
            loaded.insert(entry.address, entry);
        }

        let count = loaded.len();
        *self.validators.write() = loaded;
        info!("Reloaded {} validators from store", count);
        Ok(count)
    }

    pub fn get(&self, address: &ValidatorAddress) -> Option<ValidatorEntry> {
        self.validators.read().get(address).cloned()
    }

    pub fn is_known(&self, address: &ValidatorAddress) -> bool {
        self.validators.read().contains_key(address)
    }

    /// Lookup by the raw address bytes the host delivers.
    pub fn is_known_raw(&self, address: &[u8]) -> bool {
        ValidatorAddress::from_slice(address).map_or(false, |a| self.is_known(&a))
    }

    /// All validators in address order.
    pub fn entries(&self) -> Vec<ValidatorEntry> {
        self.validators.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }
}
