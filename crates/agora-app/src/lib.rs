//! The forum ledger application as seen by a consensus host.
//!
//! [`ForumApp`] implements [`Application`], the ABCI-style callback surface,
//! on top of the deterministic components in `agora-consensus`.

pub mod abci;
pub mod app;
pub mod application;
pub mod config;
pub mod query;

pub use app::ForumApp;
pub use application::{AppError, Application};
pub use config::{AppConfig, StorageBackend};
pub use query::QueryService;
