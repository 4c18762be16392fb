//! Records persisted in the key-value area.

use serde::{Deserialize, Serialize};

use textchat_shared::UserProfile;

/// An authenticated session: the bearer token, its expiry and the profile
/// it resolves to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    /// Epoch milliseconds, taken from the token's `exp` claim.
    #[serde(rename = "expires")]
    pub expires_at_ms: i64,
    pub user: UserProfile,
}

impl Session {
    /// A session is live strictly before its expiry instant.
    pub fn is_live_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}
