//! Per-indexer login state machine
//!
//! States: `Unauthenticated -> Authenticating -> Authenticated -> Expired`.
//! Only one login per indexer is ever in flight. Callers that arrive while a
//! login is running wait for it and share its outcome.
//!
//! The state is derived from the session store and the per-indexer lock rather
//! than stored, so a login future dropped on cancellation leaves nothing
//! half-updated behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Indexer;
use super::http::HttpExecutor;
use super::session::{CookieJar, SessionStore};
use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Expired,
}

/// Result of the adapter's check of a login response
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Cookies are merged over those set by the login response itself.
    /// Without an expiry the indexer's session lifetime applies.
    Success {
        cookies: CookieJar,
        expires_at: Option<DateTime<Utc>>,
    },
    /// Credentials rejected. `reason` is `None` when the page gave none we could read.
    Failure { reason: Option<String> },
}

impl LoginOutcome {
    pub fn success() -> Self {
        Self::Success {
            cookies: CookieJar::new(),
            expires_at: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: Some(reason.into()),
        }
    }
}

#[derive(Default)]
struct AuthSlot {
    login: tokio::sync::Mutex<()>,
    /// Bumped every time a login attempt completes
    attempts: AtomicU64,
    last_outcome: Mutex<Option<Result<()>>>,
    expired: AtomicBool,
}

/// Drives logins through the executor and records sessions in the store
pub struct AuthController {
    executor: Arc<HttpExecutor>,
    sessions: Arc<SessionStore>,
    slots: RwLock<HashMap<String, Arc<AuthSlot>>>,
}

impl AuthController {
    pub fn new(executor: Arc<HttpExecutor>, sessions: Arc<SessionStore>) -> Self {
        Self {
            executor,
            sessions,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn slot(&self, indexer_id: &str) -> Arc<AuthSlot> {
        if let Some(slot) = self.slots.read().get(indexer_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(indexer_id.to_string())
            .or_default()
            .clone()
    }

    pub fn state(&self, indexer_id: &str) -> AuthState {
        let slot = self.slots.read().get(indexer_id).cloned();
        if let Some(ref slot) = slot {
            if slot.login.try_lock().is_err() {
                return AuthState::Authenticating;
            }
        }

        match self.sessions.get(indexer_id) {
            Some(session) if session.is_valid() => AuthState::Authenticated,
            Some(_) if slot.as_ref().is_some_and(|s| s.expired.load(Ordering::SeqCst)) => {
                AuthState::Expired
            }
            _ => AuthState::Unauthenticated,
        }
    }

    /// Record that a request sent with session `generation` was rejected.
    ///
    /// A rejection of a session that a newer login already replaced is
    /// ignored and `false` is returned.
    pub fn mark_expired(&self, indexer_id: &str, generation: u64) -> bool {
        if !self.sessions.invalidate_generation(indexer_id, generation) {
            debug!(indexer_id = %indexer_id, generation, "Ignoring rejection of a replaced session");
            return false;
        }
        info!(indexer_id = %indexer_id, generation, "Session expired");
        self.slot(indexer_id).expired.store(true, Ordering::SeqCst);
        true
    }

    /// Make sure the indexer has a usable session, logging in if needed.
    ///
    /// With `force` the existing session is ignored, but a login that
    /// completes while this call waits still satisfies it.
    pub async fn ensure_authenticated(&self, indexer: &dyn Indexer, force: bool) -> Result<()> {
        if !indexer.requires_login() {
            return Ok(());
        }

        let id = indexer.id();
        if !force && self.has_valid_session(id) {
            return Ok(());
        }

        let slot = self.slot(id);
        let observed = slot.attempts.load(Ordering::SeqCst);
        let _guard = slot.login.lock().await;

        if slot.attempts.load(Ordering::SeqCst) != observed {
            debug!(indexer_id = %id, "Joined concurrent login");
            let last = slot.last_outcome.lock().clone();
            if let Some(outcome) = last {
                if outcome.is_err() || self.has_valid_session(id) {
                    return outcome;
                }
            }
        }
        if !force && self.has_valid_session(id) {
            return Ok(());
        }

        let outcome = self.login(indexer).await;
        *slot.last_outcome.lock() = Some(outcome.clone());
        slot.expired.store(false, Ordering::SeqCst);
        slot.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    fn has_valid_session(&self, indexer_id: &str) -> bool {
        self.sessions
            .get(indexer_id)
            .is_some_and(|session| session.is_valid())
    }

    async fn login(&self, indexer: &dyn Indexer) -> Result<()> {
        let id = indexer.id();
        let now = Utc::now();
        self.sessions.record_auth_attempt(id, now);
        info!(indexer_id = %id, "Logging in");

        let request = indexer.login_request()?;
        let response = self.executor.execute(id, &request).await?;

        match indexer.check_login(&response) {
            LoginOutcome::Success {
                cookies,
                expires_at,
            } => {
                let mut jar = response.cookies.clone();
                jar.extend(cookies);
                let expires_at = expires_at.or_else(|| indexer.session_lifetime().map(|l| now + l));
                debug!(indexer_id = %id, cookies = jar.len(), ?expires_at, "Login succeeded");
                self.sessions.update(id, jar, expires_at);
                Ok(())
            }
            LoginOutcome::Failure { reason } => {
                let message = reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "login rejected, no reason given".to_string());
                warn!(indexer_id = %id, reason = %message, "Login failed");
                self.sessions.invalidate(id);
                Err(IndexerError::Authentication(message))
            }
        }
    }
}
