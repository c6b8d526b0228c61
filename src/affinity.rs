//! Session affinity cache (spec §3, §4.4, §9).
//!
//! A single-process map with a 60s sliding TTL: no background sweeper, `moka` evicts idle
//! entries lazily on read/write, which matches "evict on read miss when expired" exactly.

use moka::sync::Cache;
use std::hash::Hasher;
use std::time::Duration;

pub type SessionKey = u64;

const AFFINITY_TTL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct SessionAffinity {
    cache: Cache<SessionKey, String>,
}

impl SessionAffinity {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().time_to_idle(AFFINITY_TTL).build(),
        }
    }

    /// Returns the account id bound to `key`, if any, and refreshes its TTL (a `get` on a
    /// `time_to_idle` cache already counts as a hit).
    pub fn get(&self, key: SessionKey) -> Option<String> {
        self.cache.get(&key)
    }

    pub fn bind(&self, key: SessionKey, account_id: impl Into<String>) {
        self.cache.insert(key, account_id.into());
    }
}

impl Default for SessionAffinity {
    fn default() -> Self {
        Self::new()
    }
}

/// Hashes the ordered prefix of assistant+user message texts supplied by the client into a
/// session key. Not a cryptographic hash — this is a cache key, not an anti-fingerprinting
/// control, so the fast path used elsewhere in this codebase for content-addressed keys
/// (`ahash`) is the right tool, not `sha2`.
pub fn session_key<'a>(messages: impl IntoIterator<Item = (&'a str, &'a str)>) -> SessionKey {
    let mut hasher = ahash::AHasher::default();
    for (role, text) in messages {
        hasher.write(role.as_bytes());
        hasher.write_u8(0);
        hasher.write(text.as_bytes());
        hasher.write_u8(0);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_prefixes_hash_equal() {
        let a = session_key([("user", "hi"), ("assistant", "hello")]);
        let b = session_key([("user", "hi"), ("assistant", "hello")]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_prefixes_hash_different() {
        let a = session_key([("user", "hi")]);
        let b = session_key([("user", "bye")]);
        assert_ne!(a, b);
    }

    #[test]
    fn bind_then_get_round_trips() {
        let affinity = SessionAffinity::new();
        let key = session_key([("user", "hi")]);
        affinity.bind(key, "acct-1");
        assert_eq!(affinity.get(key).as_deref(), Some("acct-1"));
    }

    #[test]
    fn unknown_key_misses() {
        let affinity = SessionAffinity::new();
        assert_eq!(affinity.get(42), None);
    }
}
