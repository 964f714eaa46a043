//! The persistent, single-writer, embedded state store: runs, scoped
//! memory items with a full-text index, and the tool-result cache.
//!
//! [`sqlite`] holds the only implementation, grounded in the teacher's
//! `scheduler/job_store.rs` (a `rusqlite::Connection` behind a
//! `tokio::sync::Mutex`, schema bootstrap via `execute_batch`, WAL
//! journal mode).

pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::memory::{MemoryItem, MemoryItemInput, MemoryKind, Scope};
use crate::run::Run;

pub use sqlite::SqliteStateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A ranked hit from [`StateStore::search_memory`]: the stored item
/// plus its raw and normalized BM25 rank.
#[derive(Debug, Clone)]
pub struct Hit {
    pub item: MemoryItem,
    pub bm25: f64,
    pub fts_rank: f64,
}

#[derive(Debug, Clone)]
pub struct ToolCacheEntry {
    pub created_at: String,
    pub result: Value,
}

#[derive(Debug, Clone)]
pub struct MemoryStat {
    pub scope: Scope,
    pub kind: MemoryKind,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceResult {
    pub expired: i64,
}

/// Parameters for [`StateStore::search_memory`].
pub struct SearchParams<'a> {
    pub query: &'a str,
    pub scopes: &'a [Scope],
    pub kinds: Option<&'a [MemoryKind]>,
    pub limit: usize,
    pub now_iso: &'a str,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Append a run record. Runs are append-only; never mutated.
    async fn insert_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Insert or update a memory item at `(scope, kind, dedupe_key)`,
    /// replacing its FTS row. Text is expected to already be
    /// PII-redacted by the caller (§4.10 applies before this call).
    async fn upsert_memory_item(&self, input: MemoryItemInput, now_iso: &str) -> Result<MemoryItem, StoreError>;

    /// FTS-backed search, filtered by scope (`IN`), optional kind
    /// (`IN`), and non-expired (`expires_at IS NULL OR expires_at >
    /// now_iso`), ordered by BM25 ascending, capped at `limit <= 50`.
    async fn search_memory(&self, params: SearchParams<'_>) -> Result<Vec<Hit>, StoreError>;

    /// Bump `last_used_at` and `use_count` for each distinct id.
    async fn mark_memory_used(&self, ids: &[String], now_iso: &str) -> Result<(), StoreError>;

    async fn get_tool_cache(&self, signature: &str) -> Result<Option<ToolCacheEntry>, StoreError>;

    async fn set_tool_cache(
        &self,
        tool: &str,
        signature: &str,
        args: &Value,
        result: &Value,
        now_iso: &str,
    ) -> Result<(), StoreError>;

    async fn get_memory_stats(&self) -> Result<Vec<MemoryStat>, StoreError>;

    /// Deletes expired memory items (and their FTS rows). Best-effort:
    /// callers should log rather than fail the run on error.
    async fn maintenance(&self, now_iso: &str) -> Result<MaintenanceResult, StoreError>;
}
