//! Per-indexer session state
//!
//! The store hands out snapshots: a reader always sees a complete cookie set,
//! never one that is halfway through being replaced.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Cookie name -> value. Ordered so requests built from it are reproducible.
pub type CookieJar = BTreeMap<String, String>;

/// Authentication state of one indexer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionState {
    pub cookies: CookieJar,
    /// `None` means valid until explicitly invalidated
    pub expires_at: Option<DateTime<Utc>>,
    pub last_auth_attempt: Option<DateTime<Utc>>,
    /// Bumped each time a login installs a new cookie set
    pub generation: u64,
}

impl SessionState {
    /// Whether the session can still be used at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.cookies.is_empty() {
            return false;
        }
        self.expires_at.is_none_or(|expiry| expiry > now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Thread-safe map of indexer ID -> session
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the indexer's session, if any
    pub fn get(&self, indexer_id: &str) -> Option<SessionState> {
        self.sessions.read().get(indexer_id).cloned()
    }

    /// Cookies to attach to the next request, empty when the session is gone or expired
    pub fn cookies(&self, indexer_id: &str) -> CookieJar {
        self.sessions
            .read()
            .get(indexer_id)
            .filter(|s| s.is_valid())
            .map(|s| s.cookies.clone())
            .unwrap_or_default()
    }

    /// Cookies for the next request together with the generation they belong to
    pub fn cookies_with_generation(&self, indexer_id: &str) -> (CookieJar, u64) {
        match self.sessions.read().get(indexer_id) {
            Some(s) if s.is_valid() => (s.cookies.clone(), s.generation),
            Some(s) => (CookieJar::new(), s.generation),
            None => (CookieJar::new(), 0),
        }
    }

    /// Replace the indexer's cookie set and expiry in one step, starting a new generation
    pub fn update(&self, indexer_id: &str, cookies: CookieJar, expires_at: Option<DateTime<Utc>>) {
        let mut sessions = self.sessions.write();
        let entry = sessions.entry(indexer_id.to_string()).or_default();
        entry.cookies = cookies;
        entry.expires_at = expires_at;
        entry.generation += 1;
    }

    /// Merge cookies refreshed by a data response, keeping the current expiry
    pub fn merge_cookies(&self, indexer_id: &str, cookies: &CookieJar) {
        if cookies.is_empty() {
            return;
        }
        let mut sessions = self.sessions.write();
        let entry = sessions.entry(indexer_id.to_string()).or_default();
        for (name, value) in cookies {
            entry.cookies.insert(name.clone(), value.clone());
        }
    }

    pub fn record_auth_attempt(&self, indexer_id: &str, at: DateTime<Utc>) {
        self.sessions
            .write()
            .entry(indexer_id.to_string())
            .or_default()
            .last_auth_attempt = Some(at);
    }

    /// Drop cookies and expiry, forcing a login on next use
    pub fn invalidate(&self, indexer_id: &str) {
        if let Some(session) = self.sessions.write().get_mut(indexer_id) {
            session.cookies.clear();
            session.expires_at = None;
        }
    }

    /// Invalidate only if the session is still at `generation`.
    ///
    /// Returns `false` when a newer login already replaced it.
    pub fn invalidate_generation(&self, indexer_id: &str, generation: u64) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(indexer_id) {
            Some(session) if session.generation == generation => {
                session.cookies.clear();
                session.expires_at = None;
                true
            }
            Some(_) => false,
            None => true,
        }
    }
}
