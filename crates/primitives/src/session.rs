//! Refresh-token storage
//!
//! One token per user at `refresh_token:<userId>`, expiring after
//! `session.refresh_token_ttl_days`. Storing again replaces the token and
//! restarts its lifetime. Issuing and hashing tokens happens elsewhere.

use canvass_core::keys::{refresh_token_key, validate_segment};
use canvass_core::Result;
use canvass_engine::StoreHandle;
use std::time::Duration;
use tracing::debug;

/// Refresh-token facade
#[derive(Clone, Debug)]
pub struct SessionTokens {
    store: StoreHandle,
}

impl SessionTokens {
    /// Create a facade on `store`
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Store `token` for `user_id`, replacing any previous one
    pub fn store(&self, user_id: &str, token: &str) -> Result<()> {
        validate_segment("user id", user_id)?;
        let key = refresh_token_key(user_id);
        let ttl = self.store.config().refresh_token_ttl();
        self.store
            .call("store_refresh_token", |b| b.set(&key, token.to_string(), Some(ttl)))
    }

    /// Current token of `user_id`, if one is live
    pub fn get(&self, user_id: &str) -> Result<Option<String>> {
        validate_segment("user id", user_id)?;
        let key = refresh_token_key(user_id);
        self.store.call("get_refresh_token", |b| b.get(&key))
    }

    /// Whether `token` is the live token of `user_id`
    pub fn verify(&self, user_id: &str, token: &str) -> Result<bool> {
        let valid = self
            .get(user_id)?
            .is_some_and(|stored| constant_time_eq(stored.as_bytes(), token.as_bytes()));
        if !valid {
            debug!(target: "canvass::session", user_id, "Refresh token rejected");
        }
        Ok(valid)
    }

    /// Drop the token of `user_id`; `true` if one existed
    pub fn revoke(&self, user_id: &str) -> Result<bool> {
        validate_segment("user id", user_id)?;
        let key = refresh_token_key(user_id);
        self.store.call("revoke_refresh_token", |b| b.del(&key))
    }

    /// Lifetime left on the token of `user_id`
    pub fn remaining(&self, user_id: &str) -> Result<Option<Duration>> {
        validate_segment("user id", user_id)?;
        let key = refresh_token_key(user_id);
        self.store.call("refresh_token_ttl", |b| b.ttl(&key))
    }
}

/// Compare without an early exit on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
