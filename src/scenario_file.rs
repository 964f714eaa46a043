//! Scenario file loading: parses and validates the JSON shape §6
//! names (`{id, title, seed, today, steps}`) before handing it to
//! [`analyst_core::scenario::ScenarioRunner`]. This loader, the
//! run-log writer ([`crate::run_log`]), and the report builder
//! ([`crate::report`]) are the "terminal CLI, scenario file loader,
//! run-log file writer" collaborators spec.md §1 calls out of scope
//! for the core.

use std::path::Path;

use analyst_core::scenario::Scenario;
use anyhow::{bail, Context, Result};

/// Reads and validates a scenario file. Validation failures are
/// fatal (§7 "invalid scenario" is a non-recoverable run error).
pub fn load(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading scenario file {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw).with_context(|| format!("parsing scenario file {}", path.display()))?;
    validate(&scenario)?;
    Ok(scenario)
}

fn validate(scenario: &Scenario) -> Result<()> {
    if scenario.id.trim().is_empty() {
        bail!("scenario id must not be empty");
    }
    if scenario.steps.is_empty() {
        bail!("scenario {} must have at least one step", scenario.id);
    }
    if analyst_core::clock::parse_date(&scenario.today).is_none() {
        bail!("scenario {} has an invalid `today` date: {}", scenario.id, scenario.today);
    }
    for step in &scenario.steps {
        if step.query.trim().is_empty() {
            bail!("scenario {} has a step with an empty query", scenario.id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_a_well_formed_scenario() {
        let file = write_temp(
            r#"{"id":"s1","title":"Demo","seed":42,"today":"2026-02-04","steps":[{"query":"top 10 products by sales last month"}]}"#,
        );
        let scenario = load(file.path()).unwrap();
        assert_eq!(scenario.id, "s1");
        assert_eq!(scenario.steps.len(), 1);
    }

    #[test]
    fn rejects_missing_steps() {
        let file = write_temp(r#"{"id":"s1","title":"Demo","seed":42,"today":"2026-02-04","steps":[]}"#);
        assert!(load(file.path()).is_err());
    }

    #[test]
    fn rejects_malformed_today() {
        let file = write_temp(
            r#"{"id":"s1","title":"Demo","seed":42,"today":"not-a-date","steps":[{"query":"top 10 products last month"}]}"#,
        );
        assert!(load(file.path()).is_err());
    }
}
