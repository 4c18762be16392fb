//! Session Store.
//!
//! Holds the authentication token and the authenticated user's profile in the
//! key-value area. Liveness is derived from the token's expiry; an expired or
//! unreadable session is erased the first time it is read and never handed
//! out.
//!
//! Two records are kept, written and removed together:
//! - [`TOKEN_KEY`]: `{token, expires, user}`
//! - [`USER_KEY`]: the user profile on its own
//!
//! The store is constructed once and shared by reference (`Arc`) with the API
//! client and the realtime channel. All mutation is whole-record replace or
//! clear, so readers never observe half a session.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use textchat_shared::constants::{TOKEN_KEY, USER_KEY};
use textchat_shared::{TokenClaims, UserProfile};

use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::models::Session;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

pub struct SessionStore {
    backend: Mutex<Box<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: impl KeyValueStore + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
            clock,
        }
    }

    // Every write replaces or clears whole records, so a poisoned lock still
    // guards a consistent value.
    fn backend(&self) -> MutexGuard<'_, Box<dyn KeyValueStore>> {
        self.backend.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a new session for `token`.
    ///
    /// The expiry comes from the token's `exp` claim. Fails with
    /// [`StoreError::InvalidToken`](crate::StoreError::InvalidToken) when the
    /// token is not well-formed, in which case nothing is written.
    pub fn set_session(&self, token: &str, user: UserProfile) -> Result<Session> {
        let claims = TokenClaims::parse(token)?;

        let session = Session {
            token: token.to_string(),
            expires_at_ms: claims.expires_at_ms(),
            user,
        };

        let session_json = serde_json::to_string(&session)?;
        let user_json = serde_json::to_string(&session.user)?;

        self.backend()
            .put_all(&[(TOKEN_KEY, session_json), (USER_KEY, user_json)])?;

        info!(
            user = %session.user.username,
            expires_at_ms = session.expires_at_ms,
            "session stored"
        );
        Ok(session)
    }

    /// The live token, if any. An expired or unreadable session is cleared.
    pub fn get_token(&self) -> Option<String> {
        self.live_session().map(|s| s.token)
    }

    /// The session's user, but only while the token is also live.
    pub fn get_user(&self) -> Option<UserProfile> {
        self.get_token()?;

        let raw = match self.backend().get(USER_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                error!(error = %e, "failed to read stored user");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "stored user record is corrupt, clearing");
                self.clear();
                None
            }
        }
    }

    /// The whole live session: token, expiry and user.
    pub fn session(&self) -> Option<Session> {
        let mut session = self.live_session()?;
        session.user = self.get_user()?;
        Some(session)
    }

    pub fn is_authenticated(&self) -> bool {
        self.get_token().is_some() && self.get_user().is_some()
    }

    /// Remove all persisted session state. Idempotent.
    pub fn clear(&self) {
        match self.backend().remove_all(&[TOKEN_KEY, USER_KEY]) {
            Ok(()) => debug!("session cleared"),
            Err(e) => error!(error = %e, "failed to clear session"),
        }
    }

    fn live_session(&self) -> Option<Session> {
        let raw = match self.backend().get(TOKEN_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                error!(error = %e, "failed to read stored session");
                return None;
            }
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "stored session is corrupt, clearing");
                self.clear();
                return None;
            }
        };

        if !session.is_live_at(self.clock.now_ms()) {
            info!(user = %session.user.username, "session expired, clearing");
            self.clear();
            return None;
        }

        Some(session)
    }
}
