//! LLM provider selection, model id, API key, and the optional
//! state-DB path override — the configuration surface §6 names.
//! Grounded in the teacher's `config.rs::ConfigError`/`Config::from_env`
//! shape, scoped down to what this crate actually reads from the
//! environment.

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::{HttpLlmClient, LlmError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable error: {0}")]
    Env(#[from] LlmError),
}

/// Process-wide configuration, resolved once from the environment.
/// `llm` is `None` when no provider key is set — callers fall back to
/// the heuristic/fixed-response paths rather than treating this as an
/// error.
#[derive(Default)]
pub struct AnalystConfig {
    pub llm: Option<HttpLlmClient>,
    pub state_db_path: Option<PathBuf>,
}

impl AnalystConfig {
    /// Reads `OPENROUTER_API_KEY` / `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`
    /// (in that order) and `ANALYST_LLM_MODEL` via
    /// [`HttpLlmClient::from_env`], plus `ANALYST_STATE_DB` for the
    /// state store path override.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm = HttpLlmClient::from_env()?;
        let state_db_path = std::env::var("ANALYST_STATE_DB").ok().map(PathBuf::from);
        Ok(Self { llm, state_db_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_without_any_provider_key_has_no_llm() {
        for key in ["OPENROUTER_API_KEY", "OPENAI_API_KEY", "ANTHROPIC_API_KEY", "ANALYST_STATE_DB"] {
            std::env::remove_var(key);
        }
        let config = AnalystConfig::from_env().unwrap();
        assert!(config.llm.is_none());
        assert!(config.state_db_path.is_none());
    }

    #[test]
    fn state_db_override_is_read_independent_of_llm() {
        for key in ["OPENROUTER_API_KEY", "OPENAI_API_KEY", "ANTHROPIC_API_KEY"] {
            std::env::remove_var(key);
        }
        std::env::set_var("ANALYST_STATE_DB", "/tmp/analyst-test-state.sqlite3");
        let config = AnalystConfig::from_env().unwrap();
        assert_eq!(config.state_db_path, Some(PathBuf::from("/tmp/analyst-test-state.sqlite3")));
        std::env::remove_var("ANALYST_STATE_DB");
    }
}
