//! Exact-match query cache
//!
//! Caches complete responses keyed by a fingerprint of (normalized query,
//! scoping context). Entries expire after a configurable TTL and are evicted
//! lazily on read. Recomputing a response is idempotent, so per-key races
//! are resolved last-write-wins and a broken cache degrades to a miss — a
//! caching failure must never fail or block the caller.

use crate::types::{now_unix, AgentResponse, Query};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

/// Byte separating fields in the fingerprint preimage, so that
/// ("ab", "c") and ("a", "bc") cannot collide.
const FIELD_SEPARATOR: [u8; 1] = [0x1f];

/// TTL-bounded response cache backed by the shared SQLite pool.
pub struct QueryCache {
    pool: SqlitePool,
    ttl_secs: i64,
}

impl QueryCache {
    pub fn new(pool: SqlitePool, ttl_secs: u64) -> Self {
        Self {
            pool,
            ttl_secs: ttl_secs as i64,
        }
    }

    /// Deterministic digest of the normalized query and its scoping context.
    ///
    /// The context is a `BTreeMap`, so iteration order — and therefore the
    /// digest — does not depend on the order the caller inserted keys.
    pub fn fingerprint(query: &Query) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(query.normalized.as_bytes());
        for (key, value) in &query.context {
            hasher.update(&FIELD_SEPARATOR);
            hasher.update(key.as_bytes());
            hasher.update(&FIELD_SEPARATOR);
            hasher.update(value.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Look up a response. Returns `None` on absence, expiry, store failure,
    /// or an undecodable entry. Expired entries are deleted on the way out.
    pub async fn get(&self, query: &Query) -> Option<AgentResponse> {
        let key = Self::fingerprint(query);

        let row = match sqlx::query("SELECT response, expires_at FROM query_cache WHERE key = ?")
            .bind(&key)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row?,
            Err(e) => {
                warn!("Cache read failed, treating as miss: {}", e);
                return None;
            }
        };

        let expires_at: i64 = row.get("expires_at");
        if now_unix() >= expires_at {
            debug!("Cache entry expired, evicting key {}", key);
            if let Err(e) = sqlx::query("DELETE FROM query_cache WHERE key = ?")
                .bind(&key)
                .execute(&self.pool)
                .await
            {
                warn!("Failed to evict expired cache entry: {}", e);
            }
            return None;
        }

        let raw: String = row.get("response");
        match serde_json::from_str(&raw) {
            Ok(response) => {
                debug!("Cache hit for key {}", key);
                Some(response)
            }
            Err(e) => {
                warn!("Cache entry undecodable, treating as miss: {}", e);
                None
            }
        }
    }

    /// Store a response. Upserts, so the last write for a key always wins.
    /// Failures are logged and swallowed.
    pub async fn put(&self, query: &Query, response: &AgentResponse) {
        let key = Self::fingerprint(query);

        let serialized = match serde_json::to_string(response) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize response for cache: {}", e);
                return;
            }
        };

        let now = now_unix();
        let result = sqlx::query(
            "INSERT INTO query_cache (key, response, created_at, expires_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET \
                 response = excluded.response, \
                 created_at = excluded.created_at, \
                 expires_at = excluded.expires_at",
        )
        .bind(&key)
        .bind(&serialized)
        .bind(now)
        .bind(now + self.ttl_secs)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!("Cache write failed, continuing without caching: {}", e);
        }
    }
}
