//! In-process revocation store for issued tokens.
//!
//! Each key (`prefix + user_id`) maps to the set of live tokens for that user, every
//! token with its own expiry. Revoking is removing the token (or the whole key).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::TokenSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    Access,
    Refresh,
}

#[derive(Debug)]
pub struct UserTokenCache {
    entries: DashMap<String, HashMap<String, Instant>>,
    settings: TokenSettings,
}

impl UserTokenCache {
    pub fn new(settings: TokenSettings) -> Self {
        Self {
            entries: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    fn key(&self, category: TokenCategory, user_id: u32) -> String {
        match category {
            TokenCategory::Access => format!("{}{user_id}", self.settings.access_token_key_prefix),
            TokenCategory::Refresh => format!("{}{user_id}", self.settings.refresh_token_key_prefix),
        }
    }

    fn blocker_key(&self, user_id: u32) -> String {
        format!("{}blocker:{user_id}", self.settings.access_token_key_prefix)
    }

    fn ttl(&self, category: TokenCategory) -> Duration {
        match category {
            TokenCategory::Access => self.settings.access_token_expires,
            TokenCategory::Refresh => self.settings.refresh_token_expires,
        }
    }

    fn insert(&self, key: String, token: &str, ttl: Duration) {
        let now = Instant::now();
        let mut set = self.entries.entry(key).or_default();
        set.retain(|_, expires_at| *expires_at > now);
        set.insert(token.to_string(), now + ttl);
    }

    fn contains(&self, key: &str, token: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|set| set.get(token).copied())
            .is_some_and(|expires_at| expires_at > now)
    }

    /// Records an issued token for its category's lifetime.
    pub fn add(&self, category: TokenCategory, user_id: u32, token: &str) {
        self.insert(self.key(category, user_id), token, self.ttl(category));
    }

    /// Issues and records an opaque refresh token.
    pub fn generate_refresh_token(&self, user_id: u32) -> String {
        let token = Uuid::new_v4().to_string();
        self.add(TokenCategory::Refresh, user_id, &token);
        token
    }

    pub fn exists(&self, category: TokenCategory, user_id: u32, token: &str) -> bool {
        self.contains(&self.key(category, user_id), token)
    }

    pub fn block_access_token(&self, user_id: u32, token: &str) {
        self.insert(self.blocker_key(user_id), token, self.settings.access_token_expires);
    }

    pub fn is_blocked(&self, user_id: u32, token: &str) -> bool {
        self.contains(&self.blocker_key(user_id), token)
    }

    /// Drops one token. Returns whether it was live.
    pub fn remove(&self, category: TokenCategory, user_id: u32, token: &str) -> bool {
        let key = self.key(category, user_id);
        let now = Instant::now();
        let removed = self
            .entries
            .get_mut(&key)
            .and_then(|mut set| set.remove(token))
            .is_some_and(|expires_at| expires_at > now);
        self.entries.remove_if(&key, |_, set| set.is_empty());
        removed
    }

    /// Revokes every access and refresh token of the user. Live access tokens are also
    /// put on the block list until they would have expired.
    pub fn remove_all(&self, user_id: u32) {
        if let Some((_, access)) = self.entries.remove(&self.key(TokenCategory::Access, user_id)) {
            let now = Instant::now();
            for (token, expires_at) in access {
                if expires_at > now {
                    self.insert(self.blocker_key(user_id), &token, expires_at - now);
                }
            }
        }
        self.entries.remove(&self.key(TokenCategory::Refresh, user_id));
    }
}
