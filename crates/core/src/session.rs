//! Per-scenario conversational state threaded across steps within a
//! pass. Modeled as a small explicit record passed into and returned
//! from each orchestrator step, not hidden ambient state (per the
//! design note on session coupling).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Set by the Data Presenter when `top_products` runs; read by the
    /// planner when the query references "those products".
    pub selected_product_ids: Vec<i64>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}
