//! The top-level state machine: `Start → Augment → ManagerRoute →
//! [OOD | WorkerDispatch] → Evaluate → (MaybeWrite) → Record → End`.
//! Grounded directly in the teacher's `reasoning/phases.rs`: zero-sized
//! phase markers plus `PhantomData`, each phase consuming `self`.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::agents::{insight, presenter};
use crate::clock::{iso_from_millis, Clock};
use crate::error::AnalystError;
use crate::executor::{self, ExecutionOutcome};
use crate::ids::new_id;
use crate::leverager::{self, Stage};
use crate::llm::LLMClient;
use crate::manager;
use crate::memory::{MemoryItem, MemoryItemInput, MemoryKind, Scope};
use crate::planner::{self, PlanRequest};
use crate::redaction::redact;
use crate::run::{Latencies, OrchestratorConfig, Run};
use crate::session::SessionState;
use crate::store::StateStore;
use crate::tools::DatasetQuery;

const OOD_RESPONSE: &str = "Out of scope: I can help with seller analytics (sales, traffic, benchmarks).";
const WEEK_CONVENTION_TEXT: &str =
    "Weeks are Mon\u{2013}Sun; last week/month refers to the previous calendar week/month.";

/// Each phase owns exactly the fields accumulated so far and consumes
/// `self` to produce the next; the compiler rejects calling a phase's
/// method out of order since the prior phase's type no longer exists
/// once consumed.
struct StartPhase {
    id: String,
    created_at: String,
    user_id: String,
    config: OrchestratorConfig,
    query: String,
    session: SessionState,
}

struct AugmentedPhase {
    id: String,
    created_at: String,
    user_id: String,
    config: OrchestratorConfig,
    query: String,
    augmented_query: String,
    session: SessionState,
}

struct RoutedPhase {
    id: String,
    created_at: String,
    user_id: String,
    config: OrchestratorConfig,
    query: String,
    augmented_query: String,
    session: SessionState,
    route: Option<String>,
    ood: bool,
    manager_route_ms: i64,
    memory_injected: Vec<MemoryItem>,
}

impl StartPhase {
    fn augment(self, ctx: &crate::clock::TimeContext) -> AugmentedPhase {
        let augmented_query = format!(
            "{}\n\n[context] today={} this_week={}..{} last_week={}..{} this_month={}..{} last_month={}..{}",
            self.query,
            ctx.today,
            ctx.this_week_start,
            ctx.this_week_end,
            ctx.last_week_start,
            ctx.last_week_end,
            ctx.this_month_start,
            ctx.this_month_end,
            ctx.last_month_start,
            ctx.last_month_end,
        );
        AugmentedPhase {
            id: self.id,
            created_at: self.created_at,
            user_id: self.user_id,
            config: self.config,
            query: self.query,
            augmented_query,
            session: self.session,
        }
    }
}

impl AugmentedPhase {
    fn routed(self, decision: manager::RouteDecision, cards: Vec<MemoryItem>, manager_route_ms: i64) -> RoutedPhase {
        RoutedPhase {
            id: self.id,
            created_at: self.created_at,
            user_id: self.user_id,
            config: self.config,
            query: self.query,
            augmented_query: self.augmented_query,
            session: self.session,
            route: decision.route,
            ood: decision.ood,
            manager_route_ms,
            memory_injected: cards,
        }
    }
}

/// Orchestrates one query end to end against its injected
/// collaborators. `Arc`-shared across concurrent orchestrator
/// instances exactly as the teacher shares `Arc<dyn InferenceProvider>`.
pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    llm: Option<Arc<dyn LLMClient>>,
    dataset: Arc<dyn DatasetQuery>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Seeds the global calendar-week-convention `domain_rule` card on
    /// first construction (idempotent: dedupe collapses repeats).
    pub async fn new(
        store: Arc<dyn StateStore>,
        llm: Option<Arc<dyn LLMClient>>,
        dataset: Arc<dyn DatasetQuery>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AnalystError> {
        let now_iso = iso_from_millis(clock.now_ms());
        store
            .upsert_memory_item(
                MemoryItemInput {
                    scope: Scope::global(),
                    kind: MemoryKind::DomainRule,
                    text: WEEK_CONVENTION_TEXT.to_string(),
                    meta: Default::default(),
                    importance: 0.5,
                    quality: 0.5,
                    expires_at: None,
                },
                &now_iso,
            )
            .await?;
        Ok(Self { store, llm, dataset, clock })
    }

    fn llm_ref(&self) -> Option<&dyn LLMClient> {
        self.llm.as_deref()
    }

    #[instrument(skip(self, session), fields(user_id = %user_id))]
    pub async fn run(&self, query: &str, user_id: &str, config: OrchestratorConfig, session: SessionState) -> Result<Run, AnalystError> {
        let now_ms = self.clock.now_ms();
        let now_iso = iso_from_millis(now_ms);
        let today = config
            .today_override
            .as_deref()
            .and_then(crate::clock::parse_date)
            .unwrap_or_else(|| self.clock.today());
        let ctx = crate::clock::time_context_for(today);
        let scopes = Scope::default_scopes(user_id);

        let builder = StartPhase {
            id: new_id(now_ms),
            created_at: now_iso.clone(),
            user_id: user_id.to_string(),
            config: config.clone(),
            query: query.to_string(),
            session,
        };
        let builder = builder.augment(&ctx);

        let route_started = std::time::Instant::now();
        let manager_cards = if config.memory_mode.retrieval_enabled() {
            leverager::retrieve(self.store.as_ref(), Stage::ManagerRoute, &builder.augmented_query, &scopes, &now_iso).await?
        } else {
            leverager::RetrievalResult { cards: Vec::new(), items: Vec::new() }
        };
        let decision = manager::decide(&builder.augmented_query, self.llm_ref()).await?;
        let manager_route_ms = route_started.elapsed().as_millis() as i64;
        let builder = builder.routed(decision, manager_cards.items, manager_route_ms);

        if builder.ood {
            let response = redact(OOD_RESPONSE);
            let run = Run {
                id: builder.id,
                created_at: builder.created_at,
                user_id: builder.user_id,
                config: builder.config,
                query: builder.query,
                augmented_query: builder.augmented_query,
                route: builder.route,
                ood: true,
                plan: None,
                tool_calls: Vec::new(),
                response,
                eval: None,
                latencies: Latencies { manager_route_ms: builder.manager_route_ms, worker_total_ms: 0, eval_ms: 0 },
                memory_injected: builder.memory_injected,
                session_after: builder.session,
            };
            self.store.insert_run(&run).await?;
            info!("run recorded as out-of-scope");
            return Ok(run);
        }

        let route = builder.route.clone().unwrap_or_else(|| "data_presenter".to_string());
        let worker_started = std::time::Instant::now();

        let workflow_cards = if config.memory_mode.retrieval_enabled() {
            leverager::retrieve(self.store.as_ref(), Stage::WorkflowPlan, &builder.augmented_query, &scopes, &now_iso).await?
        } else {
            leverager::RetrievalResult { cards: Vec::new(), items: Vec::new() }
        };

        let plan_result = planner::plan(
            PlanRequest {
                route: &route,
                query: &builder.query,
                augmented_query: &builder.augmented_query,
                time_context: &ctx,
                session: &builder.session,
                memory_cards: &workflow_cards.cards,
            },
            self.llm_ref(),
        )
        .await?;
        let plan = plan_result.plan;

        let caching_enabled = config.memory_mode.caching_enabled();
        let execution: ExecutionOutcome = executor::execute(&plan, self.dataset.as_ref(), Some(self.store.as_ref()), caching_enabled, &now_iso).await?;

        let mut memory_injected = builder.memory_injected;
        memory_injected.extend(workflow_cards.items);

        let (response, session_after) = if route == "insight_generator" {
            let insight_cards = if config.memory_mode.retrieval_enabled() {
                leverager::retrieve(self.store.as_ref(), Stage::InsightGenerate, &builder.augmented_query, &scopes, &now_iso).await?
            } else {
                leverager::RetrievalResult { cards: Vec::new(), items: Vec::new() }
            };
            memory_injected.extend(insight_cards.items);
            let outcome = insight::generate(&plan, &execution, builder.session, self.llm_ref()).await?;
            (outcome.response, outcome.session)
        } else {
            let outcome = presenter::present(&plan, &execution, builder.session);
            (outcome.response, outcome.session)
        };
        let response = redact(&response);
        let worker_total_ms = worker_started.elapsed().as_millis() as i64;

        let eval_started = std::time::Instant::now();
        let eval = crate::evaluator::evaluate(&builder.query, &ctx, self.dataset.as_ref(), &execution.tool_calls).await?;
        let eval_ms = eval_started.elapsed().as_millis() as i64;

        if config.memory_mode.writes_enabled() {
            if let Some(eval) = &eval {
                let writes = crate::evaluator::propose_writes(eval.quality, user_id, &builder.query, &plan, &execution.tool_calls, &eval.notes);
                for mut write in writes {
                    write.text = redact(&write.text);
                    if let Err(e) = self.store.upsert_memory_item(write, &now_iso).await {
                        warn!(error = %e, "memory write failed; continuing (best-effort)");
                    }
                }
            }
            if let Err(e) = self.store.maintenance(&now_iso).await {
                warn!(error = %e, "maintenance sweep failed (best-effort)");
            }
        }

        let run = Run {
            id: builder.id,
            created_at: builder.created_at,
            user_id: builder.user_id,
            config: builder.config,
            query: builder.query,
            augmented_query: builder.augmented_query,
            route: Some(route),
            ood: false,
            plan: Some(plan),
            tool_calls: execution.tool_calls,
            response,
            eval,
            latencies: Latencies { manager_route_ms: builder.manager_route_ms, worker_total_ms, eval_ms },
            memory_injected,
            session_after,
        };
        self.store.insert_run(&run).await?;
        info!(route = %run.route.as_deref().unwrap_or(""), quality = run.eval.as_ref().map(|e| e.quality), "run recorded");
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::SqliteStateStore;
    use crate::testing::FakeDataset;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::from_iso("2026-02-04").unwrap())
    }

    #[tokio::test]
    async fn ood_query_short_circuits_with_fixed_response() {
        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open_in_memory().unwrap());
        let dataset: Arc<dyn DatasetQuery> = Arc::new(FakeDataset::seeded(42, 120, "2025-10-01"));
        let orchestrator = Orchestrator::new(store, None, dataset, clock()).await.unwrap();

        let config = OrchestratorConfig { memory_mode: crate::run::MemoryMode::Baseline, today_override: None };
        let run = orchestrator.run("What's the weather tomorrow?", "demo", config, SessionState::default()).await.unwrap();
        assert!(run.ood);
        assert!(run.tool_calls.is_empty());
        assert_eq!(run.response, OOD_RESPONSE);
    }

    #[tokio::test]
    async fn in_scope_query_produces_a_plan_and_response() {
        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open_in_memory().unwrap());
        let dataset: Arc<dyn DatasetQuery> = Arc::new(FakeDataset::seeded(42, 120, "2025-10-01"));
        let orchestrator = Orchestrator::new(store, None, dataset, clock()).await.unwrap();

        let config = OrchestratorConfig { memory_mode: crate::run::MemoryMode::Readwrite, today_override: None };
        let run = orchestrator.run("top 10 products by sales last month", "demo", config, SessionState::default()).await.unwrap();
        assert!(!run.ood);
        assert!(run.plan.is_some());
        assert!(!run.tool_calls.is_empty());
    }
}
