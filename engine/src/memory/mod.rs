//! Per-session conversation memory
//!
//! Stores one row per query/response exchange, keyed by session. Two
//! eviction rules hold at all times: a session keeps at most
//! `message_limit` live turns (FIFO by insertion time), and no turn is ever
//! served past its `expires_at`, whichever bound trips first.
//!
//! Appends are best-effort: the orchestrator dispatches them on a detached
//! task after the response is already on its way to the caller, and a
//! failed append is logged, never retried into the response path.

use crate::error::AgentError;
use crate::types::{now_unix, SourceRef};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One recorded query/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub result_count: i64,
    pub used_fallback: bool,
    pub created_at: i64,
    pub expires_at: i64,
}

/// A turn about to be recorded; timestamps are assigned at insert.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub session_id: String,
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub result_count: i64,
    pub used_fallback: bool,
}

/// Session-scoped turn log backed by the shared SQLite pool.
pub struct ConversationMemory {
    pool: SqlitePool,
    message_limit: i64,
    ttl_secs: i64,
}

impl ConversationMemory {
    pub fn new(pool: SqlitePool, message_limit: i64, ttl_secs: u64) -> Self {
        Self {
            pool,
            message_limit,
            ttl_secs: ttl_secs as i64,
        }
    }

    /// Record a turn, then enforce both eviction bounds for its session.
    pub async fn append(&self, turn: &NewTurn) -> Result<(), AgentError> {
        let now = now_unix();
        let sources = serde_json::to_string(&turn.sources)
            .map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_turns \
             (session_id, query, answer, sources, result_count, used_fallback, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.session_id)
        .bind(&turn.query)
        .bind(&turn.answer)
        .bind(&sources)
        .bind(turn.result_count)
        .bind(turn.used_fallback)
        .bind(now)
        .bind(now + self.ttl_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;

        self.evict(&turn.session_id, now).await?;

        debug!("Recorded turn for session {}", turn.session_id);
        Ok(())
    }

    /// Drop expired turns, then oldest-first down to the message limit.
    async fn evict(&self, session_id: &str, now: i64) -> Result<(), AgentError> {
        sqlx::query("DELETE FROM conversation_turns WHERE session_id = ? AND expires_at <= ?")
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;

        let evicted = sqlx::query(
            "DELETE FROM conversation_turns \
             WHERE session_id = ? AND id NOT IN ( \
                 SELECT id FROM conversation_turns \
                 WHERE session_id = ? \
                 ORDER BY created_at DESC, id DESC \
                 LIMIT ? \
             )",
        )
        .bind(session_id)
        .bind(session_id)
        .bind(self.message_limit)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;

        if evicted.rows_affected() > 0 {
            debug!(
                "Evicted {} turn(s) past the message limit for session {}",
                evicted.rows_affected(),
                session_id
            );
        }
        Ok(())
    }

    /// Live turns for a session, oldest→newest. At most `limit` (or the
    /// configured message limit) turns are returned; when more live turns
    /// exist, the most recent ones win.
    pub async fn history(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ConversationTurn>, AgentError> {
        let limit = limit.unwrap_or(self.message_limit).max(0);

        let rows = sqlx::query(
            "SELECT session_id, query, answer, sources, result_count, used_fallback, \
                    created_at, expires_at \
             FROM ( \
                 SELECT * FROM conversation_turns \
                 WHERE session_id = ? AND expires_at > ? \
                 ORDER BY created_at DESC, id DESC \
                 LIMIT ? \
             ) \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .bind(now_unix())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::Database(e.to_string()))?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            let sources_raw: String = row.get("sources");
            let sources = serde_json::from_str(&sources_raw).unwrap_or_else(|e| {
                warn!("Undecodable sources on stored turn: {}", e);
                Vec::new()
            });

            turns.push(ConversationTurn {
                session_id: row.get("session_id"),
                query: row.get("query"),
                answer: row.get("answer"),
                sources,
                result_count: row.get("result_count"),
                used_fallback: row.get("used_fallback"),
                created_at: row.get("created_at"),
                expires_at: row.get("expires_at"),
            });
        }

        Ok(turns)
    }

    /// Delete every turn for a session. Returns how many were removed.
    pub async fn clear(&self, session_id: &str) -> Result<u64, AgentError> {
        let result = sqlx::query("DELETE FROM conversation_turns WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AgentError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// The sticky scoping context stored for a session. Degrades to an
    /// empty map on any failure — context is a hint, not a dependency.
    pub async fn context(&self, session_id: &str) -> BTreeMap<String, String> {
        let row = match sqlx::query("SELECT context FROM session_contexts WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!("Failed to read session context: {}", e);
                return BTreeMap::new();
            }
        };

        row.and_then(|r| {
            let raw: String = r.get("context");
            serde_json::from_str(&raw).ok()
        })
        .unwrap_or_default()
    }

    /// Upsert the sticky scoping context for a session.
    pub async fn save_context(
        &self,
        session_id: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<(), AgentError> {
        let serialized = serde_json::to_string(context)
            .map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;

        sqlx::query(
            "INSERT INTO session_contexts (session_id, context, updated_at) \
             VALUES (?, ?, ?) \
             ON CONFLICT(session_id) DO UPDATE SET \
                 context = excluded.context, \
                 updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(&serialized)
        .bind(now_unix())
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::PersistenceFailed(e.to_string()))?;

        Ok(())
    }

    /// (distinct sessions, live turns) across the whole store.
    pub async fn counts(&self) -> Result<(u64, u64), AgentError> {
        let now = now_unix();
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT session_id) AS sessions, COUNT(*) AS turns \
             FROM conversation_turns WHERE expires_at > ?",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AgentError::Database(e.to_string()))?;

        let sessions: i64 = row.get("sessions");
        let turns: i64 = row.get("turns");
        Ok((sessions as u64, turns as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    async fn setup(limit: i64) -> (TempDir, ConversationMemory) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let memory = ConversationMemory::new(db.pool().clone(), limit, 3600);
        (temp_dir, memory)
    }

    fn turn(session: &str, n: usize) -> NewTurn {
        NewTurn {
            session_id: session.to_string(),
            query: format!("question {}", n),
            answer: format!("answer {}", n),
            sources: vec![],
            result_count: 0,
            used_fallback: false,
        }
    }

    #[tokio::test]
    async fn test_append_and_history_round_trip() {
        let (_tmp, memory) = setup(20).await;

        memory.append(&turn("s1", 1)).await.unwrap();
        memory.append(&turn("s1", 2)).await.unwrap();

        let history = memory.history("s1", None).await.unwrap();
        assert_eq!(history.len(), 2);
        // Oldest first
        assert_eq!(history[0].query, "question 1");
        assert_eq!(history[1].query, "question 2");
    }

    #[tokio::test]
    async fn test_fifo_eviction_keeps_most_recent() {
        let (_tmp, memory) = setup(3).await;

        for n in 1..=4 {
            memory.append(&turn("s1", n)).await.unwrap();
        }

        let history = memory.history("s1", None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].query, "question 2");
        assert_eq!(history[2].query, "question 4");

        // The oldest turn is gone from the table, not just filtered
        let rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversation_turns WHERE session_id = 's1'",
        )
        .fetch_one(&memory.pool)
        .await
        .unwrap();
        assert_eq!(rows, 3);
    }

    #[tokio::test]
    async fn test_expired_turn_excluded_below_count_bound() {
        let (_tmp, memory) = setup(20).await;

        memory.append(&turn("s1", 1)).await.unwrap();
        memory.append(&turn("s1", 2)).await.unwrap();

        // Expire the first turn only
        sqlx::query(
            "UPDATE conversation_turns SET expires_at = ? WHERE query = 'question 1'",
        )
        .bind(now_unix() - 5)
        .execute(&memory.pool)
        .await
        .unwrap();

        let history = memory.history("s1", None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "question 2");
    }

    #[tokio::test]
    async fn test_caller_limit_returns_most_recent() {
        let (_tmp, memory) = setup(20).await;

        for n in 1..=5 {
            memory.append(&turn("s1", n)).await.unwrap();
        }

        let history = memory.history("s1", Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "question 4");
        assert_eq!(history[1].query, "question 5");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let (_tmp, memory) = setup(20).await;

        memory.append(&turn("s1", 1)).await.unwrap();
        memory.append(&turn("s2", 2)).await.unwrap();

        assert_eq!(memory.history("s1", None).await.unwrap().len(), 1);
        assert_eq!(memory.history("s2", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_removes_only_target_session() {
        let (_tmp, memory) = setup(20).await;

        memory.append(&turn("s1", 1)).await.unwrap();
        memory.append(&turn("s1", 2)).await.unwrap();
        memory.append(&turn("s2", 3)).await.unwrap();

        assert_eq!(memory.clear("s1").await.unwrap(), 2);
        assert!(memory.history("s1", None).await.unwrap().is_empty());
        assert_eq!(memory.history("s2", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_session_context_round_trip() {
        let (_tmp, memory) = setup(20).await;

        assert!(memory.context("s1").await.is_empty());

        let mut ctx = BTreeMap::new();
        ctx.insert("community_type".to_string(), "gaming".to_string());
        memory.save_context("s1", &ctx).await.unwrap();

        let loaded = memory.context("s1").await;
        assert_eq!(loaded.get("community_type").map(String::as_str), Some("gaming"));

        // Upsert replaces
        ctx.insert("size".to_string(), "large".to_string());
        memory.save_context("s1", &ctx).await.unwrap();
        assert_eq!(memory.context("s1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_counts() {
        let (_tmp, memory) = setup(20).await;

        memory.append(&turn("s1", 1)).await.unwrap();
        memory.append(&turn("s1", 2)).await.unwrap();
        memory.append(&turn("s2", 3)).await.unwrap();

        let (sessions, turns) = memory.counts().await.unwrap();
        assert_eq!(sessions, 2);
        assert_eq!(turns, 3);
    }
}
