//! Crate-level error aggregation.
//!
//! Each component owns a focused `thiserror` enum; `AnalystError`
//! aggregates them with `#[from]` so callers can use `?` end to end,
//! mirroring the teacher crate's `RuntimeError` aggregation pattern.

use thiserror::Error;

use crate::evaluator::EvaluatorError;
use crate::executor::ExecutorError;
use crate::manager::ManagerError;
use crate::planner::PlannerError;
use crate::store::StoreError;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),

    #[error("evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),

    #[error("scenario validation error: {0}")]
    Validation(String),
}
