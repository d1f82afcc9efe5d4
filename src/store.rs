//! Collaborator interfaces: credential, history and activity stores.
//!
//! The core engine consumes these seams only. The in-memory
//! implementations in [`memory`] back the binary and the scenario tests;
//! a database-backed deployment substitutes its own adapters here.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::{MemoryAuthStore, MemoryHistoryStore, MemoryRankStore};

/// Failure surfaced by credential verification or registration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No account exists under this username.
    #[error("user {0} does not exist, register first")]
    UnknownUser(String),

    /// The password does not match the stored credential.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration clashed with an existing account.
    #[error("username {0} is already registered")]
    DuplicateUser(String),

    /// The backing store failed.
    #[error("auth store failure: {0}")]
    Store(String),
}

/// Failure in the history or rank store.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("store failure: {0}")]
pub struct StoreError(pub String);

/// One persisted room event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEvent {
    pub sender: String,
    pub content: String,
    /// Empty for broadcast events.
    pub receiver: String,
}

/// Credential storage and verification.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Check `password` against the stored credential for `username`.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing why the login was refused.
    async fn verify_user(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Create a new account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DuplicateUser`] if the name is taken, or
    /// [`AuthError::Store`] on a backend failure.
    async fn add_user(&self, username: &str, password: &str) -> Result<(), AuthError>;
}

/// Append-only room history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record one event. `receiver` is empty for broadcast events.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on a backend failure.
    async fn append_event(
        &self,
        sender: &str,
        content: &str,
        receiver: &str,
    ) -> Result<(), StoreError>;

    /// Up to `n` most recent events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on a backend failure.
    async fn read_recent(&self, n: usize) -> Result<Vec<HistoryEvent>, StoreError>;
}

/// Per-user activity scores.
#[async_trait]
pub trait RankStore: Send + Sync {
    /// Add `weight` to the activity score of `username`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on a backend failure.
    async fn increment_activity(&self, username: &str, weight: f64) -> Result<(), StoreError>;

    /// `(username, score)` pairs ordered by score descending.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on a backend failure.
    async fn rank_snapshot(&self) -> Result<Vec<(String, f64)>, StoreError>;
}
