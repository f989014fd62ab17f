// FORUM APPLICATION: QUERY SERVICE
// Read-only lookups over committed state for external callers.
//
// SAFETY INVARIANTS:
// 1. Queries never mutate the store or the registry
// 2. Every read goes through the store's committed view, never the staging buffer
// 3. The reported height is the one the returned data was read at

use crate::abci::{RequestQuery, ResponseQuery};
use agora_consensus::ValidatorRegistry;
use agora_core::{ResponseCode, ValidatorAddress};
use agora_state::{ForumStore, StoreError};
use log::debug;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub const PATH_VALIDATORS: &str = "/val";
pub const PATH_HISTORY: &str = "/history";
pub const PATH_MESSAGES: &str = "/messages";
pub const PATH_USER: &str = "/user";
pub const PATH_WORDS: &str = "/words";

/// Data value that selects the full history on any path.
const LEGACY_HISTORY: &str = "history";

/// Reads retried when a commit lands between the height check and the data read.
const CONSISTENT_READ_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
enum QueryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Bad query: {0}")]
    BadRequest(String),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to encode response: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Committed state kept changing during the query")]
    Unstable,
}

impl QueryError {
    fn code(&self) -> ResponseCode {
        match self {
            QueryError::NotFound(_) => ResponseCode::NotFound,
            QueryError::BadRequest(_) => ResponseCode::InvalidTxFormat,
            QueryError::Store(_) | QueryError::Unstable => ResponseCode::StoreUnavailable,
            QueryError::Encoding(_) => ResponseCode::EncodingError,
        }
    }
}

pub struct QueryService {
    store: Arc<dyn ForumStore>,
    registry: Arc<ValidatorRegistry>,
}

impl QueryService {
    pub fn new(store: Arc<dyn ForumStore>, registry: Arc<ValidatorRegistry>) -> Self {
        QueryService { store, registry }
    }

    pub fn handle(&self, req: &RequestQuery) -> ResponseQuery {
        match self.read_consistent(req) {
            Ok((height, Ok(json))) => ResponseQuery {
                code: ResponseCode::Ok,
                value: json.clone().into_bytes(),
                log: json,
                height,
            },
            Ok((height, Err(e))) => failure(req, height, e),
            Err(e) => failure(req, 0, e),
        }
    }

    /// Route `req` between two equal reads of the committed height. The
    /// outer error means no stable height could be read.
    fn read_consistent(
        &self,
        req: &RequestQuery,
    ) -> Result<(u64, Result<String, QueryError>), QueryError> {
        for _ in 0..CONSISTENT_READ_ATTEMPTS {
            let before = self.store.committed_height()?;
            let routed = self.route(req);
            if self.store.committed_height()? == before {
                return Ok((before, routed));
            }
            debug!("Commit landed during query {}; retrying", req.path);
        }
        Err(QueryError::Unstable)
    }

    fn route(&self, req: &RequestQuery) -> Result<String, QueryError> {
        let data = std::str::from_utf8(&req.data)
            .map_err(|_| QueryError::BadRequest("query data is not UTF-8".to_string()))?
            .trim();

        if req.path == PATH_HISTORY || data == LEGACY_HISTORY {
            return to_json(&self.store.history()?);
        }

        match req.path.as_str() {
            PATH_VALIDATORS if data.is_empty() => to_json(&self.registry.entries()),
            PATH_VALIDATORS => {
                let address = ValidatorAddress::from_hex(data)
                    .map_err(|e| QueryError::BadRequest(e.to_string()))?;
                let entry = self
                    .registry
                    .get(&address)
                    .ok_or_else(|| QueryError::NotFound(format!("validator {}", address)))?;
                to_json(&entry)
            }
            PATH_USER => {
                let user = self
                    .store
                    .find_user(data)?
                    .ok_or_else(|| QueryError::NotFound(format!("user {}", data)))?;
                to_json(&user)
            }
            PATH_WORDS => {
                let words: Vec<String> = self.store.moderation_words()?.iter().cloned().collect();
                to_json(&words)
            }
            // PATH_MESSAGES and anything else: data names the sender
            _ => to_json(&self.store.messages_by_sender(data)?),
        }
    }
}

fn failure(req: &RequestQuery, height: u64, e: QueryError) -> ResponseQuery {
    debug!("Query {} failed: {}", req.path, e);
    ResponseQuery {
        code: e.code(),
        value: Vec::new(),
        log: e.to_string(),
        height,
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, QueryError> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{
        LedgerMessage, Message, ModerationWordSet, PublicKey, User, ValidatorEntry, ValidatorUpdate,
    };
    use agora_state::{MemoryStore, WriteSet};
    use ed25519_dalek::SigningKey;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn query(path: &str, data: &str) -> RequestQuery {
        RequestQuery {
            path: path.to_string(),
            data: data.as_bytes().to_vec(),
            height: 0,
        }
    }

    fn service() -> (Arc<MemoryStore>, Arc<ValidatorRegistry>, QueryService) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ValidatorRegistry::new());
        let key = SigningKey::from_bytes(&[5u8; 32]).verifying_key().to_bytes();
        let mut set = WriteSet::new();
        registry
            .apply_updates(
                &[ValidatorUpdate::new(PublicKey::ed25519(key.to_vec()), 10)],
                &mut set,
            )
            .unwrap();
        set.put_user(User::new("alice"));
        set.append_message(LedgerMessage::new(0, Message::new("alice", "hello")));
        set.append_message(LedgerMessage::new(1, Message::new("bob", "hey")));
        set.add_moderation_words(ModerationWordSet::starter());
        set.set_committed_height(2);
        store.write(set).unwrap();
        let service = QueryService::new(store.clone(), registry.clone());
        (store, registry, service)
    }

    #[test]
    fn test_history_paths() {
        let (_, _, service) = service();
        let by_path = service.handle(&query(PATH_HISTORY, ""));
        let legacy = service.handle(&query("/anything", "history"));
        assert_eq!(by_path.code, ResponseCode::Ok);
        assert_eq!(by_path.value, legacy.value);
        assert_eq!(by_path.height, 2);
        let msgs: Vec<LedgerMessage> = serde_json::from_slice(&by_path.value).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(by_path.log.as_bytes(), by_path.value.as_slice());
    }

    #[test]
    fn test_messages_by_sender() {
        let (_, _, service) = service();
        for path in [PATH_MESSAGES, "/legacy"] {
            let resp = service.handle(&query(path, "alice"));
            let msgs: Vec<LedgerMessage> = serde_json::from_slice(&resp.value).unwrap();
            assert_eq!(msgs.len(), 1);
            assert_eq!(msgs[0].body, "hello");
        }
    }

    #[test]
    fn test_validator_lookup() {
        let (_, registry, service) = service();
        let address = registry.entries()[0].address;
        let resp = service.handle(&query(PATH_VALIDATORS, &address.to_hex()));
        assert_eq!(resp.code, ResponseCode::Ok);
        let all = service.handle(&query(PATH_VALIDATORS, ""));
        assert_eq!(all.code, ResponseCode::Ok);

        let missing = service.handle(&query(PATH_VALIDATORS, &"00".repeat(20)));
        assert_eq!(missing.code, ResponseCode::NotFound);
        assert!(missing.value.is_empty());

        let bad = service.handle(&query(PATH_VALIDATORS, "zz"));
        assert_eq!(bad.code, ResponseCode::InvalidTxFormat);
    }

    #[test]
    fn test_user_and_words() {
        let (_, _, service) = service();
        let resp = service.handle(&query(PATH_USER, "alice"));
        let user: User = serde_json::from_slice(&resp.value).unwrap();
        assert_eq!(user, User::new("alice"));
        assert_eq!(
            service.handle(&query(PATH_USER, "nobody")).code,
            ResponseCode::NotFound
        );

        let resp = service.handle(&query(PATH_WORDS, ""));
        let words: Vec<String> = serde_json::from_slice(&resp.value).unwrap();
        assert_eq!(words.len(), 4);
    }

    #[test]
    fn test_store_outage() {
        let (store, _, service) = service();
        store.set_unavailable(true);
        let resp = service.handle(&query(PATH_HISTORY, ""));
        assert_eq!(resp.code, ResponseCode::StoreUnavailable);
        assert!(resp.value.is_empty());

        let resp = service.handle(&query(PATH_USER, "alice"));
        assert_eq!(resp.code, ResponseCode::StoreUnavailable);
        assert_eq!(resp.height, 0);
    }

    /// Commits one block from inside the first `history` read.
    struct CommitDuringRead {
        inner: MemoryStore,
        fired: AtomicBool,
    }

    impl ForumStore for CommitDuringRead {
        fn find_user(&self, name: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_user(name)
        }
        fn moderation_words(&self) -> Result<ModerationWordSet, StoreError> {
            self.inner.moderation_words()
        }
        fn history(&self) -> Result<Vec<LedgerMessage>, StoreError> {
            let before = self.inner.history()?;
            if !self.fired.swap(true, Ordering::SeqCst) {
                let mut set = WriteSet::new();
                set.append_message(LedgerMessage::new(0, Message::new("amy", "late")));
                set.set_committed_height(1);
                self.inner.write(set)?;
            }
            Ok(before)
        }
        fn messages_by_sender(&self, sender: &str) -> Result<Vec<LedgerMessage>, StoreError> {
            self.inner.messages_by_sender(sender)
        }
        fn validators(&self) -> Result<Vec<ValidatorEntry>, StoreError> {
            self.inner.validators()
        }
        fn committed_height(&self) -> Result<u64, StoreError> {
            self.inner.committed_height()
        }
        fn next_message_seq(&self) -> Result<u64, StoreError> {
            self.inner.next_message_seq()
        }
        fn write(&self, set: WriteSet) -> Result<(), StoreError> {
            self.inner.write(set)
        }
    }

    #[test]
    fn test_height_matches_data_when_commit_lands_mid_query() {
        let store = Arc::new(CommitDuringRead {
            inner: MemoryStore::new(),
            fired: AtomicBool::new(false),
        });
        let service = QueryService::new(store, Arc::new(ValidatorRegistry::new()));
        let resp = service.handle(&query(PATH_HISTORY, ""));
        assert_eq!(resp.code, ResponseCode::Ok);
        assert_eq!(resp.height, 1);
        let msgs: Vec<LedgerMessage> = serde_json::from_slice(&resp.value).unwrap();
        assert_eq!(msgs.len(), 1);
    }
}
