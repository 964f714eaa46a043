//! SQLite-backed `StateStore`, grounded in the teacher's
//! `scheduler/job_store.rs`: a `rusqlite::Connection` behind a
//! `tokio::sync::Mutex`, WAL journal mode, schema bootstrap via
//! `execute_batch`, and a `memory_fts` FTS5 virtual table for BM25
//! ranking.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use super::{Hit, MaintenanceResult, MemoryStat, SearchParams, StateStore, StoreError, ToolCacheEntry};
use crate::ids::new_id;
use crate::memory::{dedupe_key, MemoryItem, MemoryItemInput, MemoryKind, Scope};
use crate::run::Run;

pub struct SqliteStateStore {
    conn: tokio::sync::Mutex<rusqlite::Connection>,
}

impl SqliteStateStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Sqlite(format!("create dir: {e}")))?;
        }
        let conn = rusqlite::Connection::open(path).map_err(|e| StoreError::Sqlite(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: tokio::sync::Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| StoreError::Sqlite(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: tokio::sync::Mutex::new(conn) })
    }

    /// Default path: `$XDG_DATA_HOME/analyst/state.db`, suffixed per
    /// scenario config by the caller (see `ScenarioRunner`).
    pub fn default_path() -> std::path::PathBuf {
        let base = dirs::data_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        base.join("analyst").join("state.db")
    }

    fn init_schema(conn: &rusqlite::Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                user_id TEXT NOT NULL,
                config_json TEXT NOT NULL,
                query TEXT NOT NULL,
                augmented_query TEXT NOT NULL,
                route TEXT,
                ood INTEGER NOT NULL,
                plan_json TEXT,
                tool_calls_json TEXT NOT NULL,
                response TEXT NOT NULL,
                eval_json TEXT,
                latencies_json TEXT NOT NULL,
                memory_injected_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memory_items (
                id TEXT PRIMARY KEY,
                scope TEXT NOT NULL,
                kind TEXT NOT NULL,
                text TEXT NOT NULL,
                meta_json TEXT NOT NULL,
                dedupe_key TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_used_at TEXT,
                use_count INTEGER NOT NULL DEFAULT 0,
                importance REAL NOT NULL,
                quality REAL NOT NULL,
                expires_at TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_memory_items_unique
                ON memory_items(scope, kind, dedupe_key);

            CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
                id UNINDEXED, text, kind, scope
            );

            CREATE TABLE IF NOT EXISTS tool_cache (
                signature TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                tool TEXT NOT NULL,
                args_json TEXT NOT NULL,
                result_json TEXT NOT NULL
            );",
        )
        .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        Ok(())
    }
}

fn row_to_memory_item(row: &rusqlite::Row) -> rusqlite::Result<MemoryItem> {
    let scope: String = row.get("scope")?;
    let kind: String = row.get("kind")?;
    let meta_json: String = row.get("meta_json")?;
    Ok(MemoryItem {
        id: row.get("id")?,
        scope: Scope(scope),
        kind: MemoryKind::parse(&kind).unwrap_or(MemoryKind::DomainRule),
        text: row.get("text")?,
        meta: serde_json::from_str(&meta_json).unwrap_or_default(),
        dedupe_key: row.get("dedupe_key")?,
        created_at: row.get("created_at")?,
        last_used_at: row.get("last_used_at")?,
        use_count: row.get::<_, i64>("use_count")? as u32,
        importance: row.get("importance")?,
        quality: row.get("quality")?,
        expires_at: row.get("expires_at")?,
    })
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn insert_run(&self, run: &Run) -> Result<(), StoreError> {
        let config_json = serde_json::to_string(&run.config).map_err(ser_err)?;
        let plan_json = run.plan.as_ref().map(serde_json::to_string).transpose().map_err(ser_err)?;
        let tool_calls_json = serde_json::to_string(&run.tool_calls).map_err(ser_err)?;
        let eval_json = run.eval.as_ref().map(serde_json::to_string).transpose().map_err(ser_err)?;
        let latencies_json = serde_json::to_string(&run.latencies).map_err(ser_err)?;
        let memory_injected_json = serde_json::to_string(&run.memory_injected).map_err(ser_err)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO runs
                (id, created_at, user_id, config_json, query, augmented_query,
                 route, ood, plan_json, tool_calls_json, response, eval_json,
                 latencies_json, memory_injected_json)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                run.id,
                run.created_at,
                run.user_id,
                config_json,
                run.query,
                run.augmented_query,
                run.route,
                run.ood as i32,
                plan_json,
                tool_calls_json,
                run.response,
                eval_json,
                latencies_json,
                memory_injected_json,
            ],
        )
        .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        Ok(())
    }

    async fn upsert_memory_item(
        &self,
        input: MemoryItemInput,
        now_iso: &str,
    ) -> Result<MemoryItem, StoreError> {
        let key = dedupe_key(input.kind, &input.text);
        let meta_json = serde_json::to_string(&input.meta).map_err(ser_err)?;
        let conn = self.conn.lock().await;

        let existing: Option<(String, u32)> = conn
            .query_row(
                "SELECT id, use_count FROM memory_items WHERE scope = ?1 AND kind = ?2 AND dedupe_key = ?3",
                params![input.scope.as_str(), input.kind.as_str(), key],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u32)),
            )
            .optional()
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;

        let (id, created_at, use_count) = match existing {
            Some((id, use_count)) => {
                conn.execute(
                    "UPDATE memory_items
                        SET text = ?1, meta_json = ?2, importance = ?3, quality = ?4,
                            expires_at = ?5, last_used_at = ?6, use_count = use_count + 1
                      WHERE id = ?7",
                    params![
                        input.text,
                        meta_json,
                        input.importance,
                        input.quality,
                        input.expires_at,
                        now_iso,
                        id,
                    ],
                )
                .map_err(|e| StoreError::Sqlite(e.to_string()))?;
                conn.execute("DELETE FROM memory_fts WHERE id = ?1", params![id])
                    .map_err(|e| StoreError::Sqlite(e.to_string()))?;
                let created_at: String = conn
                    .query_row("SELECT created_at FROM memory_items WHERE id = ?1", params![id], |r| r.get(0))
                    .map_err(|e| StoreError::Sqlite(e.to_string()))?;
                (id, created_at, use_count + 1)
            }
            None => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                let id = new_id(now_ms);
                conn.execute(
                    "INSERT INTO memory_items
                        (id, scope, kind, text, meta_json, dedupe_key, created_at,
                         last_used_at, use_count, importance, quality, expires_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,NULL,0,?8,?9,?10)",
                    params![
                        id,
                        input.scope.as_str(),
                        input.kind.as_str(),
                        input.text,
                        meta_json,
                        key,
                        now_iso,
                        input.importance,
                        input.quality,
                        input.expires_at,
                    ],
                )
                .map_err(|e| StoreError::Sqlite(e.to_string()))?;
                (id, now_iso.to_string(), 0)
            }
        };

        conn.execute(
            "INSERT INTO memory_fts (id, text, kind, scope) VALUES (?1,?2,?3,?4)",
            params![id, input.text, input.kind.as_str(), input.scope.as_str()],
        )
        .map_err(|e| StoreError::Sqlite(e.to_string()))?;

        Ok(MemoryItem {
            id,
            scope: input.scope,
            kind: input.kind,
            text: input.text,
            meta: input.meta,
            dedupe_key: key,
            created_at,
            last_used_at: Some(now_iso.to_string()),
            use_count,
            importance: input.importance,
            quality: input.quality,
            expires_at: input.expires_at,
        })
    }

    async fn search_memory(&self, params: SearchParams<'_>) -> Result<Vec<Hit>, StoreError> {
        let limit = params.limit.min(50);
        if params.scopes.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;

        let scope_placeholders: Vec<String> = (0..params.scopes.len())
            .map(|i| format!("?{}", i + 2))
            .collect();
        let mut sql = format!(
            "SELECT m.id, m.scope, m.kind, m.text, m.meta_json, m.dedupe_key, m.created_at,
                    m.last_used_at, m.use_count, m.importance, m.quality, m.expires_at,
                    bm25(memory_fts) AS rank
             FROM memory_fts
             JOIN memory_items m ON m.id = memory_fts.id
             WHERE memory_fts MATCH ?1
               AND m.scope IN ({})
               AND (m.expires_at IS NULL OR m.expires_at > ?{})",
            scope_placeholders.join(","),
            params.scopes.len() + 2,
        );

        let kind_start = params.scopes.len() + 3;
        if let Some(kinds) = params.kinds {
            if kinds.is_empty() {
                return Ok(Vec::new());
            }
            let kind_placeholders: Vec<String> =
                (0..kinds.len()).map(|i| format!("?{}", kind_start + i)).collect();
            sql.push_str(&format!(" AND m.kind IN ({})", kind_placeholders.join(",")));
        }
        sql.push_str(" ORDER BY rank ASC LIMIT ?");
        let limit_idx = kind_start + params.kinds.map(|k| k.len()).unwrap_or(0);
        sql = sql.replacen("LIMIT ?", &format!("LIMIT ?{limit_idx}"), 1);

        let mut stmt = conn.prepare(&sql).map_err(|e| StoreError::Sqlite(e.to_string()))?;

        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        bind.push(Box::new(params.query.to_string()));
        for s in params.scopes {
            bind.push(Box::new(s.as_str().to_string()));
        }
        bind.push(Box::new(params.now_iso.to_string()));
        if let Some(kinds) = params.kinds {
            for k in kinds {
                bind.push(Box::new(k.as_str().to_string()));
            }
        }
        bind.push(Box::new(limit as i64));

        let bind_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();

        let rows = stmt
            .query_map(bind_refs.as_slice(), |row| {
                let item = row_to_memory_item(row)?;
                let bm25: f64 = row.get("rank")?;
                Ok((item, bm25))
            })
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;

        let mut hits = Vec::new();
        for row in rows {
            let (item, bm25) = row.map_err(|e| StoreError::Sqlite(e.to_string()))?;
            let relevance = (-bm25).max(0.0);
            let fts_rank = relevance / (1.0 + relevance);
            hits.push(Hit { item, bm25, fts_rank });
        }
        Ok(hits)
    }

    async fn mark_memory_used(&self, ids: &[String], now_iso: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let mut seen = std::collections::HashSet::new();
        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            conn.execute(
                "UPDATE memory_items SET last_used_at = ?1, use_count = use_count + 1 WHERE id = ?2",
                params![now_iso, id],
            )
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        }
        Ok(())
    }

    async fn get_tool_cache(&self, signature: &str) -> Result<Option<ToolCacheEntry>, StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT created_at, result_json FROM tool_cache WHERE signature = ?1",
            params![signature],
            |row| {
                let created_at: String = row.get(0)?;
                let result_json: String = row.get(1)?;
                Ok((created_at, result_json))
            },
        )
        .optional()
        .map_err(|e| StoreError::Sqlite(e.to_string()))?
        .map(|(created_at, result_json)| {
            let result: Value = serde_json::from_str(&result_json).map_err(ser_err)?;
            Ok(ToolCacheEntry { created_at, result })
        })
        .transpose()
    }

    async fn set_tool_cache(
        &self,
        tool: &str,
        signature: &str,
        args: &Value,
        result: &Value,
        now_iso: &str,
    ) -> Result<(), StoreError> {
        let args_json = serde_json::to_string(args).map_err(ser_err)?;
        let result_json = serde_json::to_string(result).map_err(ser_err)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tool_cache (signature, created_at, tool, args_json, result_json)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(signature) DO UPDATE SET
                created_at = excluded.created_at,
                args_json = excluded.args_json,
                result_json = excluded.result_json",
            params![signature, now_iso, tool, args_json, result_json],
        )
        .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        Ok(())
    }

    async fn get_memory_stats(&self) -> Result<Vec<MemoryStat>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT scope, kind, COUNT(*) FROM memory_items GROUP BY scope, kind")
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let scope: String = row.get(0)?;
                let kind: String = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok((scope, kind, count))
            })
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let (scope, kind, count) = row.map_err(|e| StoreError::Sqlite(e.to_string()))?;
            out.push(MemoryStat {
                scope: Scope(scope),
                kind: MemoryKind::parse(&kind).unwrap_or(MemoryKind::DomainRule),
                count,
            });
        }
        Ok(out)
    }

    async fn maintenance(&self, now_iso: &str) -> Result<MaintenanceResult, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id FROM memory_items WHERE expires_at IS NOT NULL AND expires_at <= ?1")
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        let expired_ids: Vec<String> = stmt
            .query_map(params![now_iso], |row| row.get(0))
            .map_err(|e| StoreError::Sqlite(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::Sqlite(e.to_string()))?;

        for id in &expired_ids {
            conn.execute("DELETE FROM memory_items WHERE id = ?1", params![id])
                .map_err(|e| StoreError::Sqlite(e.to_string()))?;
            conn.execute("DELETE FROM memory_fts WHERE id = ?1", params![id])
                .map_err(|e| StoreError::Sqlite(e.to_string()))?;
        }
        Ok(MaintenanceResult { expired: expired_ids.len() as i64 })
    }
}

fn ser_err(e: serde_json::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryItemInput;
    use std::collections::HashMap;

    fn item(scope: Scope, kind: MemoryKind, text: &str) -> MemoryItemInput {
        MemoryItemInput {
            scope,
            kind,
            text: text.to_string(),
            meta: HashMap::new(),
            importance: 0.3,
            quality: 0.5,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn dedupe_collapses_repeated_upserts() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let a = store
            .upsert_memory_item(item(Scope::global(), MemoryKind::DomainRule, "Last month means last calendar month"), "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let b = store
            .upsert_memory_item(item(Scope::global(), MemoryKind::DomainRule, "last month means last calendar month"), "2026-01-02T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(a.id, b.id);

        let stats = store.get_memory_stats().await.unwrap();
        let total: i64 = stats.iter().map(|s| s.count).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn search_respects_scope_and_kind_filters() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .upsert_memory_item(item(Scope::global(), MemoryKind::DomainRule, "weeks run monday to sunday"), "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        store
            .upsert_memory_item(item(Scope::user("demo"), MemoryKind::QueryPattern, "top products by sales last month"), "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        let hits = store
            .search_memory(SearchParams {
                query: "monday OR sunday",
                scopes: &[Scope::global()],
                kinds: Some(&[MemoryKind::DomainRule]),
                limit: 10,
                now_iso: "2026-01-02T00:00:00Z",
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].item.text.contains("monday"));
    }

    #[tokio::test]
    async fn expired_items_are_excluded_from_search() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let mut input = item(Scope::global(), MemoryKind::DomainRule, "stale rule about weeks");
        input.expires_at = Some("2026-01-01T00:00:00Z".to_string());
        store.upsert_memory_item(input, "2025-12-01T00:00:00Z").await.unwrap();

        let hits = store
            .search_memory(SearchParams {
                query: "weeks",
                scopes: &[Scope::global()],
                kinds: None,
                limit: 10,
                now_iso: "2026-02-01T00:00:00Z",
            })
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn tool_cache_round_trips() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let args = serde_json::json!({"metric": "sales"});
        let result = serde_json::json!({"rows": []});
        store.set_tool_cache("top_products", "top_products:abc", &args, &result, "2026-01-01T00:00:00Z").await.unwrap();
        let got = store.get_tool_cache("top_products:abc").await.unwrap().unwrap();
        assert_eq!(got.result, result);
    }

    #[tokio::test]
    async fn maintenance_deletes_expired_items() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let mut input = item(Scope::global(), MemoryKind::DomainRule, "expiring rule");
        input.expires_at = Some("2026-01-01T00:00:00Z".to_string());
        store.upsert_memory_item(input, "2025-12-01T00:00:00Z").await.unwrap();

        let result = store.maintenance("2026-02-01T00:00:00Z").await.unwrap();
        assert_eq!(result.expired, 1);

        let stats = store.get_memory_stats().await.unwrap();
        let total: i64 = stats.iter().map(|s| s.count).sum();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn fts_rank_prefers_the_stronger_bm25_match() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .upsert_memory_item(item(Scope::global(), MemoryKind::DomainRule, "sales sales sales sales conversion"), "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        store
            .upsert_memory_item(item(Scope::global(), MemoryKind::DomainRule, "a brief unrelated note that also mentions sales once"), "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        let hits = store
            .search_memory(SearchParams { query: "sales", scopes: &[Scope::global()], kinds: None, limit: 10, now_iso: "2026-01-02T00:00:00Z" })
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        // bm25 is negative for real matches; a stronger match has a more
        // negative bm25 and must yield a strictly higher fts_rank.
        assert!(hits[0].bm25 < hits[1].bm25);
        assert!(hits[0].fts_rank > hits[1].fts_rank, "a stronger (more negative) bm25 match must score a higher fts_rank");
    }

    #[tokio::test]
    async fn mark_memory_used_dedupes_ids_and_increments_once() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let created = store
            .upsert_memory_item(item(Scope::global(), MemoryKind::DomainRule, "rule text"), "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        store
            .mark_memory_used(&[created.id.clone(), created.id.clone()], "2026-01-02T00:00:00Z")
            .await
            .unwrap();
        let hits = store
            .search_memory(SearchParams {
                query: "rule",
                scopes: &[Scope::global()],
                kinds: None,
                limit: 10,
                now_iso: "2026-01-03T00:00:00Z",
            })
            .await
            .unwrap();
        assert_eq!(hits[0].item.use_count, 1);
    }
}
