//! Memory retrieval and ranking (read path). Grounded in the
//! teacher's `reasoning/knowledge_bridge.rs` (pre-step context
//! injection) and `context/markdown_memory.rs` (card-style text
//! rendering).

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use tracing::instrument;

use crate::memory::{MemoryItem, MemoryKind, Scope};
use crate::store::{SearchParams, StateStore, StoreError};

const DEFAULT_LIMIT: usize = 30;
const TOP_K: usize = 6;
const MAX_CARD_CHARS: usize = 600;
const MAX_QUERY_TOKENS: usize = 12;
const RECENCY_HALFLIFE_DAYS: f64 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ManagerRoute,
    WorkflowPlan,
    InsightGenerate,
}

impl Stage {
    fn kinds(self) -> &'static [MemoryKind] {
        match self {
            Stage::ManagerRoute => &[MemoryKind::DomainRule, MemoryKind::QueryPattern, MemoryKind::UserPreference],
            Stage::WorkflowPlan => &[
                MemoryKind::ToolTemplate,
                MemoryKind::QueryPattern,
                MemoryKind::DomainRule,
                MemoryKind::FailureCase,
                MemoryKind::UserPreference,
            ],
            Stage::InsightGenerate => &[
                MemoryKind::InsightPattern,
                MemoryKind::UserPreference,
                MemoryKind::DomainRule,
                MemoryKind::FailureCase,
                MemoryKind::QueryPattern,
            ],
        }
    }
}

fn stopwords() -> &'static [&'static str] {
    &["the", "and", "for", "with", "show", "what", "were", "last", "this", "that", "those", "month", "week", "products", "product", "top"]
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9_]+").unwrap())
}

/// Builds the FTS `MATCH` query: lowercase + collapse whitespace,
/// prepend phrase hints when present, tokenize, drop stopwords and
/// short tokens, cap at 12 unique tokens, join with `OR`.
pub fn build_query(input: &str) -> String {
    let cleaned = input.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");

    let mut parts: Vec<String> = Vec::new();
    for phrase in ["last month", "last week", "top products"] {
        if cleaned.contains(phrase) {
            parts.push(format!("\"{phrase}\""));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for m in token_re().find_iter(&cleaned) {
        let tok = m.as_str();
        if tok.len() < 3 || stopwords().contains(&tok) {
            continue;
        }
        if seen.insert(tok.to_string()) {
            parts.push(tok.to_string());
        }
        if parts.len() >= MAX_QUERY_TOKENS {
            break;
        }
    }

    if parts.is_empty() {
        cleaned
    } else {
        parts.join(" OR ")
    }
}

fn recency(item: &MemoryItem, now: chrono::DateTime<Utc>) -> f64 {
    let age_days = match item.last_used_at.as_deref().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) {
        Some(dt) => (now - dt.with_timezone(&Utc)).num_seconds() as f64 / 86_400.0,
        None => RECENCY_HALFLIFE_DAYS,
    };
    (-age_days.max(0.0) / RECENCY_HALFLIFE_DAYS).exp()
}

/// `0.55·ftsRank + 0.25·recency + 0.15·importance + 0.05·log1p(useCount)`.
/// The weights are part of the contract (§9 design note); not tunable
/// at runtime in this implementation, but kept as named constants.
pub const WEIGHT_FTS: f64 = 0.55;
pub const WEIGHT_RECENCY: f64 = 0.25;
pub const WEIGHT_IMPORTANCE: f64 = 0.15;
pub const WEIGHT_USE_COUNT: f64 = 0.05;

fn score(item: &MemoryItem, fts_rank: f64, now: chrono::DateTime<Utc>) -> f64 {
    WEIGHT_FTS * fts_rank
        + WEIGHT_RECENCY * recency(item, now)
        + WEIGHT_IMPORTANCE * item.importance
        + WEIGHT_USE_COUNT * (item.use_count as f64).ln_1p()
}

fn clean_body(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders a bounded memory card: a three-line layout capped at
/// [`MAX_CARD_CHARS`], with an ellipsis suffix when truncated.
pub fn render_card(item: &MemoryItem) -> String {
    let header = format!("MEMORY CARD [{}] ({})", item.kind.as_str(), item.scope.as_str());
    let body = clean_body(&item.text);
    let last = item.last_used_at.as_deref().map(|s| &s[..s.len().min(10)]).unwrap_or("never");
    let signals = format!("Signals: q={:.2} imp={:.2} used={} last={}", item.quality, item.importance, item.use_count, last);

    let mut card = format!("{header}\n{body}\n{signals}");
    if card.chars().count() > MAX_CARD_CHARS {
        let budget = MAX_CARD_CHARS.saturating_sub(header.len() + signals.len() + 5);
        let truncated_body: String = body.chars().take(budget).collect();
        card = format!("{header}\n{truncated_body}...\n{signals}");
    }
    card
}

pub struct RetrievalResult {
    pub cards: Vec<String>,
    pub items: Vec<MemoryItem>,
}

#[instrument(skip(store), fields(stage = ?stage))]
pub async fn retrieve(
    store: &dyn StateStore,
    stage: Stage,
    query: &str,
    scopes: &[Scope],
    now_iso: &str,
) -> Result<RetrievalResult, StoreError> {
    let fts_query = build_query(query);
    let hits = store
        .search_memory(SearchParams { query: &fts_query, scopes, kinds: Some(stage.kinds()), limit: DEFAULT_LIMIT, now_iso })
        .await?;

    let now = chrono::DateTime::parse_from_rfc3339(now_iso).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now());

    let mut ranked: Vec<_> = hits.into_iter().map(|h| (score(&h.item, h.fts_rank, now), h.item)).collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(TOP_K);

    let items: Vec<MemoryItem> = ranked.into_iter().map(|(_, item)| item).collect();
    let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
    if !ids.is_empty() {
        store.mark_memory_used(&ids, now_iso).await?;
    }

    let cards = items.iter().map(render_card).collect();
    Ok(RetrievalResult { cards, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryItemInput;
    use crate::store::SqliteStateStore;
    use std::collections::HashMap;

    #[test]
    fn build_query_drops_stopwords_and_short_tokens() {
        let q = build_query("What were the top products for sales last month");
        assert!(!q.contains(" the "));
        assert!(q.contains("sales"));
    }

    #[test]
    fn build_query_prepends_phrase_hints() {
        let q = build_query("show me last month sales");
        assert!(q.contains("\"last month\""));
    }

    #[test]
    fn render_card_has_three_lines_and_header() {
        let item = MemoryItem {
            id: "1".into(),
            scope: Scope::global(),
            kind: MemoryKind::DomainRule,
            text: "Last month refers to the previous calendar month.".into(),
            meta: HashMap::new(),
            dedupe_key: "x".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            last_used_at: Some("2026-01-02T00:00:00Z".into()),
            use_count: 3,
            importance: 0.5,
            quality: 0.8,
            expires_at: None,
        };
        let card = render_card(&item);
        assert!(card.starts_with("MEMORY CARD [domain_rule] (global)"));
        assert_eq!(card.lines().count(), 3);
        assert!(card.chars().count() <= MAX_CARD_CHARS);
    }

    #[test]
    fn render_card_truncates_long_text() {
        let item = MemoryItem {
            id: "1".into(),
            scope: Scope::global(),
            kind: MemoryKind::DomainRule,
            text: "x".repeat(2000),
            meta: HashMap::new(),
            dedupe_key: "x".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            last_used_at: None,
            use_count: 0,
            importance: 0.1,
            quality: 0.1,
            expires_at: None,
        };
        let card = render_card(&item);
        assert!(card.chars().count() <= MAX_CARD_CHARS);
        assert!(card.contains("..."));
    }

    #[tokio::test]
    async fn retrieve_finds_seeded_domain_rule() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .upsert_memory_item(
                MemoryItemInput {
                    scope: Scope::global(),
                    kind: MemoryKind::DomainRule,
                    text: "Last month refers to the previous calendar month.".to_string(),
                    meta: HashMap::new(),
                    importance: 0.5,
                    quality: 0.5,
                    expires_at: None,
                },
                "2026-01-01T00:00:00Z",
            )
            .await
            .unwrap();

        let result = retrieve(&store, Stage::WorkflowPlan, "Top 10 products last month by sales", &[Scope::global()], "2026-02-04T00:00:00Z")
            .await
            .unwrap();
        assert!(!result.cards.is_empty());
        assert!(result.cards[0].starts_with("MEMORY CARD [domain_rule] (global)"));
    }

    #[tokio::test]
    async fn retrieve_caps_at_six_cards() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        for i in 0..10 {
            store
                .upsert_memory_item(
                    MemoryItemInput {
                        scope: Scope::global(),
                        kind: MemoryKind::DomainRule,
                        text: format!("rule number {i} about sales reporting conventions"),
                        meta: HashMap::new(),
                        importance: 0.5,
                        quality: 0.5,
                        expires_at: None,
                    },
                    "2026-01-01T00:00:00Z",
                )
                .await
                .unwrap();
        }
        let result = retrieve(&store, Stage::WorkflowPlan, "sales reporting conventions", &[Scope::global()], "2026-02-04T00:00:00Z")
            .await
            .unwrap();
        assert!(result.cards.len() <= TOP_K);
    }
}
