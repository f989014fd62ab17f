//! Records, wire codec and error taxonomy shared by every agora crate.
//!
//! Nothing in this crate touches storage or the consensus host; all types
//! are plain data with deterministic encodings.

// === Wire format ===
pub mod transaction;

// === Records ===
pub mod moderation;
pub mod user;
pub mod validator;

// === Codes and errors ===
pub mod codes;
pub mod error;

pub use codes::ResponseCode;
pub use error::ForumError;
pub use moderation::{ModerationWordSet, MAX_EXTENSION_WORDS, STARTER_WORDS, WORD_DELIMITER};
pub use transaction::{BanDirective, CodecError, LedgerMessage, Message, Transaction};
pub use user::User;
pub use validator::{
    KeyError, KeyType, PublicKey, ValidatorAddress, ValidatorEntry, ValidatorUpdate, ADDRESS_LEN,
};

/// ABCI protocol version reported through `Info`.
pub const PROTOCOL_VERSION: &str = "2.0.0";

/// Application version reported through `Info`.
pub const APP_VERSION: u64 = 1;
