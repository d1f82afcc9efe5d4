//! Live sessions and the concurrent username registry.
//!
//! The registry is the only state shared across connection tasks. Every
//! operation takes one whole-registry critical section, and no network
//! I/O ever happens while it is held: broadcast and list callers copy
//! what they need under the lock and write after releasing it.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::push::PushHandle;

/// Error returned when a username already has a live session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("username {0} already has a live session")]
pub struct DuplicateUsername(pub String);

/// Server-side record of one authenticated connection.
pub struct Session {
    username: String,
    handle: PushHandle,
    cancel: CancellationToken,
    last_heartbeat: Mutex<Instant>,
    left: AtomicBool,
}

impl Session {
    /// Build a session around a connection's delivery handle and
    /// cancellation token.
    #[must_use]
    pub fn new(username: impl Into<String>, handle: PushHandle, cancel: CancellationToken) -> Self {
        Self {
            username: username.into(),
            handle,
            cancel,
            last_heartbeat: Mutex::new(Instant::now()),
            left: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str { &self.username }

    #[must_use]
    pub fn handle(&self) -> &PushHandle { &self.handle }

    /// Refresh the liveness timestamp.
    pub fn beat(&self) {
        *self.last_heartbeat.lock().expect("heartbeat lock poisoned") = Instant::now();
    }

    #[must_use]
    pub fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.lock().expect("heartbeat lock poisoned")
    }

    /// Close the connection handle.
    ///
    /// This is the sole cancellation signal: the connection's read loop and
    /// writer task both observe it and wind the connection down.
    pub fn close(&self) { self.cancel.cancel(); }

    /// Wait until the session has been closed.
    pub async fn closed(&self) { self.cancel.cancelled().await; }
}

/// Authoritative concurrent mapping from username to live session.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Insert a freshly authenticated session.
    ///
    /// The existence check and the insert happen under one critical
    /// section, so two concurrent logins for the same name can never both
    /// succeed.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateUsername`] if the name already has a live
    /// session.
    pub fn insert(&self, session: Arc<Session>) -> Result<(), DuplicateUsername> {
        let mut map = self.lock();
        match map.entry(session.username().to_owned()) {
            Entry::Occupied(_) => Err(DuplicateUsername(session.username().to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// Remove a session by name. No-op if the name is absent.
    pub fn remove(&self, username: &str) -> Option<Arc<Session>> { self.lock().remove(username) }

    #[must_use]
    pub fn lookup(&self, username: &str) -> Option<Arc<Session>> {
        self.lock().get(username).cloned()
    }

    #[must_use]
    pub fn contains(&self, username: &str) -> bool { self.lock().contains_key(username) }

    #[must_use]
    pub fn len(&self) -> usize { self.lock().len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    /// Point-in-time sorted copy of the online usernames.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Copy the delivery handles of everyone except `sender`.
    ///
    /// Callers perform their writes after this returns, so one slow peer
    /// cannot stall the registry for the rest of the room.
    #[must_use]
    pub fn recipients_except(&self, sender: &str) -> Vec<(String, PushHandle)> {
        self.lock()
            .iter()
            .filter(|(name, _)| name.as_str() != sender)
            .map(|(name, session)| (name.clone(), session.handle().clone()))
            .collect()
    }

    /// One-shot removal guard for the cleanup path.
    ///
    /// Removes `session` only while the map still holds this exact
    /// session, and flips its departure flag under the same critical
    /// section. Returns `true` for exactly one caller per session no
    /// matter how many cleanup paths race; a newer session that reused
    /// the name is left untouched.
    pub fn remove_if_current(&self, session: &Arc<Session>) -> bool {
        let mut map = self.lock();
        if map
            .get(session.username())
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            map.remove(session.username());
        }
        !session.left.swap(true, Ordering::AcqRel)
    }

    /// Sessions whose last heartbeat is older than `timeout` at `now`.
    #[must_use]
    pub fn stale_sessions(&self, timeout: Duration, now: Instant) -> Vec<Arc<Session>> {
        self.lock()
            .values()
            .filter(|session| now.duration_since(session.last_heartbeat()) > timeout)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.inner.lock().expect("registry lock poisoned")
    }
}
