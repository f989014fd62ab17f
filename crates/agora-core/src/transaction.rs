// FORUM LEDGER: TRANSACTION WIRE FORMAT
// The two transaction kinds the ledger accepts: posts and bans.
//
// SAFETY INVARIANTS:
// 1. The kind of a transaction is decided by the explicit "type" tag only,
//    never by inspecting the payload text
// 2. Encoding is deterministic: identical records encode to identical bytes
// 3. Decoding never succeeds for a record with an empty identity field

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed transaction: {0}")]
    Malformed(String),

    #[error("Expected a {expected} transaction, found {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Field {0} must not be empty")]
    EmptyField(&'static str),

    #[error("Failed to encode transaction: {0}")]
    Encode(String),
}

/// A forum post as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Identity of the author
    pub sender: String,

    /// Post text
    pub body: String,
}

impl Message {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Message {
            sender: sender.into(),
            body: body.into(),
        }
    }

    /// Decode raw bytes that must hold a post transaction.
    pub fn parse(raw: &[u8]) -> Result<Self, CodecError> {
        match Transaction::decode(raw)? {
            Transaction::Post(msg) => Ok(msg),
            Transaction::Ban(_) => Err(CodecError::WrongKind {
                expected: "post",
                found: "ban",
            }),
        }
    }

    /// Encode as a tagged post transaction.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Transaction::Post(self.clone()).encode()
    }
}

/// Control transaction banning a user; emitted only by the proposer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BanDirective {
    /// Name of the user being banned
    #[serde(rename = "username")]
    pub target: String,
}

impl BanDirective {
    pub fn new(target: impl Into<String>) -> Self {
        BanDirective {
            target: target.into(),
        }
    }

    /// Encode as a tagged ban transaction.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Transaction::Ban(self.clone()).encode()
    }
}

/// Tagged union of every transaction kind carried in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transaction {
    Post(Message),
    Ban(BanDirective),
}

impl Transaction {
    /// Decode and shape-check a raw transaction.
    pub fn decode(raw: &[u8]) -> Result<Self, CodecError> {
        let tx: Transaction =
            serde_json::from_slice(raw).map_err(|e| CodecError::Malformed(e.to_string()))?;
        tx.validate()?;
        Ok(tx)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        self.validate()?;
        serde_json::to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::Post(_) => "post",
            Transaction::Ban(_) => "ban",
        }
    }

    pub fn is_ban(&self) -> bool {
        matches!(self, Transaction::Ban(_))
    }

    fn validate(&self) -> Result<(), CodecError> {
        match self {
            Transaction::Post(msg) if msg.sender.trim().is_empty() => {
                Err(CodecError::EmptyField("sender"))
            }
            Transaction::Ban(ban) if ban.target.trim().is_empty() => {
                Err(CodecError::EmptyField("username"))
            }
            _ => Ok(()),
        }
    }
}

/// A committed post with its position in the global history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMessage {
    /// Insertion ordinal, strictly increasing across the whole ledger
    pub seq: u64,
    pub sender: String,
    pub body: String,
}

impl LedgerMessage {
    pub fn new(seq: u64, msg: Message) -> Self {
        LedgerMessage {
            seq,
            sender: msg.sender,
            body: msg.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_post_wire_shape() {
        let raw = Message::new("alice", "hello").encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["type"], "post");
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["body"], "hello");
    }

    #[test]
    fn test_ban_wire_shape() {
        let raw = BanDirective::new("bob").encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["type"], "ban");
        assert_eq!(json["username"], "bob");
    }

    #[test]
    fn test_post_mentioning_username_stays_a_post() {
        let raw = Message::new("carol", "my username is carol").encode().unwrap();
        let tx = Transaction::decode(&raw).unwrap();
        assert!(!tx.is_ban());
        assert_eq!(tx.kind(), "post");
    }

    #[test]
    fn test_untagged_record_is_malformed() {
        let raw = br#"{"sender":"alice","body":"hi"}"#;
        assert!(matches!(
            Transaction::decode(raw),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            Transaction::decode(b"\x00\x01not json"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_sender_rejected() {
        let raw = br#"{"type":"post","sender":"  ","body":"hi"}"#;
        assert_eq!(
            Transaction::decode(raw),
            Err(CodecError::EmptyField("sender"))
        );
        assert!(Message::new("", "x").encode().is_err());
    }

    #[test]
    fn test_parse_post_rejects_ban() {
        let raw = BanDirective::new("bob").encode().unwrap();
        assert_eq!(
            Message::parse(&raw),
            Err(CodecError::WrongKind {
                expected: "post",
                found: "ban"
            })
        );
    }

    proptest! {
        #[test]
        fn prop_message_round_trip(sender in "[a-z][a-z0-9_]{0,15}", body in ".{0,64}") {
            let msg = Message::new(sender, body);
            let raw = msg.encode().unwrap();
            prop_assert_eq!(Message::parse(&raw).unwrap(), msg);
        }

        #[test]
        fn prop_ban_round_trip(target in "[a-z][a-z0-9_]{0,15}") {
            let ban = BanDirective::new(target);
            let raw = ban.encode().unwrap();
            prop_assert_eq!(Transaction::decode(&raw).unwrap(), Transaction::Ban(ban));
        }
    }
}
