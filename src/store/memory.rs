//! In-memory collaborator stores.

use std::{
    collections::{HashMap, VecDeque, hash_map::Entry},
    sync::Mutex,
};

use async_trait::async_trait;

use super::{AuthError, AuthStore, HistoryEvent, HistoryStore, RankStore, StoreError};

/// Maximum number of events retained by [`MemoryHistoryStore`].
const HISTORY_CAP: usize = 100;

/// Credential store backed by a hash map.
#[derive(Default)]
pub struct MemoryAuthStore {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryAuthStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn verify_user(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let users = self.users.lock().expect("auth store lock poisoned");
        match users.get(username) {
            None => Err(AuthError::UnknownUser(username.to_owned())),
            Some(stored) if stored == password => Ok(()),
            Some(_) => Err(AuthError::InvalidCredentials),
        }
    }

    async fn add_user(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut users = self.users.lock().expect("auth store lock poisoned");
        match users.entry(username.to_owned()) {
            Entry::Occupied(_) => Err(AuthError::DuplicateUser(username.to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(password.to_owned());
                Ok(())
            }
        }
    }
}

/// Bounded history ring; the oldest events are dropped past the cap.
#[derive(Default)]
pub struct MemoryHistoryStore {
    events: Mutex<VecDeque<HistoryEvent>>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append_event(
        &self,
        sender: &str,
        content: &str,
        receiver: &str,
    ) -> Result<(), StoreError> {
        let mut events = self.events.lock().expect("history store lock poisoned");
        events.push_back(HistoryEvent {
            sender: sender.to_owned(),
            content: content.to_owned(),
            receiver: receiver.to_owned(),
        });
        while events.len() > HISTORY_CAP {
            events.pop_front();
        }
        Ok(())
    }

    async fn read_recent(&self, n: usize) -> Result<Vec<HistoryEvent>, StoreError> {
        let events = self.events.lock().expect("history store lock poisoned");
        let start = events.len().saturating_sub(n);
        Ok(events.iter().skip(start).cloned().collect())
    }
}

/// Activity scores backed by a hash map.
#[derive(Default)]
pub struct MemoryRankStore {
    scores: Mutex<HashMap<String, f64>>,
}

impl MemoryRankStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl RankStore for MemoryRankStore {
    async fn increment_activity(&self, username: &str, weight: f64) -> Result<(), StoreError> {
        let mut scores = self.scores.lock().expect("rank store lock poisoned");
        *scores.entry(username.to_owned()).or_default() += weight;
        Ok(())
    }

    async fn rank_snapshot(&self) -> Result<Vec<(String, f64)>, StoreError> {
        let scores = self.scores.lock().expect("rank store lock poisoned");
        let mut snapshot: Vec<(String, f64)> =
            scores.iter().map(|(name, score)| (name.clone(), *score)).collect();
        snapshot.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(snapshot)
    }
}
