//! The memory item data model: scope, kind, dedupe key, and usage/decay
//! bookkeeping shared by the [`crate::store`], [`crate::leverager`], and
//! [`crate::evaluator`] modules.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A memory scope: `"global"` or `"user:<id>"`, kept as a plain string
/// per the design note that callers only need equality, not a tagged
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope(pub String);

impl Scope {
    pub fn global() -> Self {
        Scope("global".to_string())
    }

    pub fn user(user_id: &str) -> Self {
        Scope(format!("user:{user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `["global", "user:<id>"]` scope list used by all three
    /// retrieval stages and by memory writes.
    pub fn default_scopes(user_id: &str) -> Vec<Scope> {
        vec![Scope::global(), Scope::user(user_id)]
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Taxonomy of memory intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    ToolTemplate,
    QueryPattern,
    DomainRule,
    InsightPattern,
    FailureCase,
    UserPreference,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::ToolTemplate => "tool_template",
            MemoryKind::QueryPattern => "query_pattern",
            MemoryKind::DomainRule => "domain_rule",
            MemoryKind::InsightPattern => "insight_pattern",
            MemoryKind::FailureCase => "failure_case",
            MemoryKind::UserPreference => "user_preference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "tool_template" => MemoryKind::ToolTemplate,
            "query_pattern" => MemoryKind::QueryPattern,
            "domain_rule" => MemoryKind::DomainRule,
            "insight_pattern" => MemoryKind::InsightPattern,
            "failure_case" => MemoryKind::FailureCase,
            "user_preference" => MemoryKind::UserPreference,
            _ => return None,
        })
    }
}

/// A single memory item as persisted by the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub scope: Scope,
    pub kind: MemoryKind,
    pub text: String,
    pub meta: HashMap<String, Value>,
    pub dedupe_key: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub use_count: u32,
    pub importance: f64,
    pub quality: f64,
    pub expires_at: Option<String>,
}

/// `sha256(kind + lowercased, whitespace-collapsed, length-capped text)`.
pub fn dedupe_key(kind: MemoryKind, text: &str) -> String {
    const MAX_LEN: usize = 2000;
    let collapsed: String = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let capped: String = collapsed.chars().take(MAX_LEN).collect();

    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(capped.as_bytes());
    hex::encode(hasher.finalize())
}

/// Input to `StateStore::upsert_memory_item` — everything the caller
/// supplies; `id`/`created_at`/`use_count` are computed or defaulted by
/// the store on first insert.
#[derive(Debug, Clone)]
pub struct MemoryItemInput {
    pub scope: Scope,
    pub kind: MemoryKind,
    pub text: String,
    pub meta: HashMap<String, Value>,
    pub importance: f64,
    pub quality: f64,
    pub expires_at: Option<String>,
}
