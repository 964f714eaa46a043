//! Scripted fakes used by unit/integration tests and by the CLI's
//! `--fake-llm` demo mode. Never referenced from production
//! orchestration code — only from tests and the CLI boundary (§9 open
//! question: the "baseline-confused" planner is a testing affordance,
//! not a product feature).

mod fake_dataset;
mod fake_llm;

pub use fake_dataset::FakeDataset;
pub use fake_llm::{ConfusedFakeLlmClient, FakeLlmClient};
