//! Agora: a forum ledger driven by an external BFT consensus host.
//!
//! Re-exports the workspace crates so integration tests and embedders can
//! depend on a single package.

pub use agora_app;
pub use agora_consensus;
pub use agora_core;
pub use agora_state;
