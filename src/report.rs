//! Report file writer: serializes a [`ScenarioReport`] to the JSON
//! shape §6 names (`{scenario, summaries}`).

use std::path::Path;

use analyst_core::scenario::ScenarioReport;
use anyhow::{Context, Result};

pub fn write(report: &ScenarioReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing scenario report")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    std::fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))?;
    Ok(())
}
