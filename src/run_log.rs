//! Run log writer: appends one JSON `Run` record per line to
//! `runs-YYYYMMDD.jsonl`, per §6 "Run log".

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use analyst_core::run::Run;
use anyhow::{Context, Result};

pub struct RunLogWriter {
    dir: PathBuf,
}

impl RunLogWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, created_at: &str) -> PathBuf {
        let date_prefix: String = created_at.chars().take(10).collect::<String>().replace('-', "");
        self.dir.join(format!("runs-{date_prefix}.jsonl"))
    }

    /// Appends `run` as one JSON line to the file matching its
    /// `created_at` date. Best-effort per §7 (a failed run-log write
    /// must not invalidate an otherwise successful run); callers
    /// should log rather than propagate.
    pub fn append(&self, run: &Run) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| format!("creating run log directory {}", self.dir.display()))?;
        let path = self.path_for(&run.created_at);
        let mut file = OpenOptions::new().create(true).append(true).open(&path).with_context(|| format!("opening run log {}", path.display()))?;
        let line = serde_json::to_string(run).context("serializing run")?;
        writeln!(file, "{line}").with_context(|| format!("appending to run log {}", path.display()))?;
        Ok(())
    }
}

/// Reads back every `Run` record under `dir`, across all
/// `runs-*.jsonl` files it contains. Used by tooling that inspects a
/// prior session's runs (e.g. a future `analyst runs tail` command).
pub fn read_all(dir: &Path) -> Result<Vec<Run>> {
    let mut runs = Vec::new();
    if !dir.exists() {
        return Ok(runs);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading run log directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "jsonl").unwrap_or(false))
        .collect();
    paths.sort();
    for path in paths {
        let content = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let run: Run = serde_json::from_str(line).with_context(|| format!("parsing run log line in {}", path.display()))?;
            runs.push(run);
        }
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::run::{Latencies, MemoryMode, OrchestratorConfig};
    use analyst_core::session::SessionState;

    fn sample_run(created_at: &str) -> Run {
        Run {
            id: "1".to_string(),
            created_at: created_at.to_string(),
            user_id: "demo".to_string(),
            config: OrchestratorConfig { memory_mode: MemoryMode::Baseline, today_override: None },
            query: "top 10 products".to_string(),
            augmented_query: "top 10 products".to_string(),
            route: Some("data_presenter".to_string()),
            ood: false,
            plan: None,
            tool_calls: vec![],
            response: "No results.".to_string(),
            eval: None,
            latencies: Latencies::default(),
            memory_injected: vec![],
            session_after: SessionState::default(),
        }
    }

    #[test]
    fn appends_and_reads_back_runs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RunLogWriter::new(dir.path());
        writer.append(&sample_run("2026-02-04T00:00:00Z")).unwrap();
        writer.append(&sample_run("2026-02-04T01:00:00Z")).unwrap();
        writer.append(&sample_run("2026-02-05T00:00:00Z")).unwrap();

        let runs = read_all(dir.path()).unwrap();
        assert_eq!(runs.len(), 3);
    }

    #[test]
    fn separates_files_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RunLogWriter::new(dir.path());
        writer.append(&sample_run("2026-02-04T00:00:00Z")).unwrap();
        writer.append(&sample_run("2026-02-05T00:00:00Z")).unwrap();

        assert!(dir.path().join("runs-20260204.jsonl").exists());
        assert!(dir.path().join("runs-20260205.jsonl").exists());
    }
}
