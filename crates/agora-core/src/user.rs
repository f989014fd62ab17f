use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const USER_KEY_DOMAIN: &[u8] = b"agora-user:";

/// A forum participant, keyed by name.
///
/// SAFETY: Users are never deleted and `banned` only ever flips to true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,

    /// Deterministic per-name key; identical on every replica
    #[serde(with = "hex::serde")]
    pub pub_key: Vec<u8>,

    pub moderator: bool,

    pub banned: bool,
}

impl User {
    /// First sighting of a poster.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let pub_key = derive_user_key(&name);
        User {
            name,
            pub_key,
            moderator: false,
            banned: false,
        }
    }

    /// First sighting of a name through a ban.
    pub fn new_banned(name: impl Into<String>) -> Self {
        let mut user = Self::new(name);
        user.banned = true;
        user
    }

    /// Returns true if the flag changed.
    pub fn ban(&mut self) -> bool {
        let changed = !self.banned;
        self.banned = true;
        changed
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "User {} (moderator={}, banned={})",
            self.name, self.moderator, self.banned
        )
    }
}

fn derive_user_key(name: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(USER_KEY_DOMAIN);
    hasher.update(name.as_bytes());
    hasher.finalize().to_vec()
}
