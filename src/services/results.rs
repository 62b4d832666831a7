use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::AppResult, services::simulation::SimulationReport};

/// Aggregate numbers written to `summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub seed: u64,
    pub agents: usize,
    pub skipped_agents: usize,
    pub recommendations_per_agent: usize,
    pub total_recommendations: usize,
    pub average_onboarding_rating: Option<f64>,
    pub average_recommendation_rating: Option<f64>,
    pub playlists_created: usize,
}

impl From<&SimulationReport> for RunSummary {
    fn from(report: &SimulationReport) -> Self {
        let onboarding_ratings: Vec<f64> = report
            .onboarding
            .iter()
            .filter_map(|r| r.average_rating)
            .collect();

        Self {
            started_at: report.started_at,
            seed: report.seed,
            agents: report.onboarding.len(),
            skipped_agents: report.skipped_agents.len(),
            recommendations_per_agent: report.recommendations_per_agent,
            total_recommendations: report.rounds.iter().map(|r| r.result.len()).sum(),
            average_onboarding_rating: (!onboarding_ratings.is_empty()).then(|| {
                onboarding_ratings.iter().sum::<f64>() / onboarding_ratings.len() as f64
            }),
            average_recommendation_rating: report.average_recommendation_rating(),
            playlists_created: report.playlists_created(),
        }
    }
}

/// Dumps simulation runs as JSON Lines under a results directory
#[derive(Debug, Clone)]
pub struct ResultsWriter {
    root: PathBuf,
}

impl ResultsWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory a run started at `started_at` is written to
    pub fn run_dir(&self, started_at: DateTime<Utc>) -> PathBuf {
        self.root
            .join(format!("run_{}", started_at.format("%Y%m%d_%H%M%S")))
    }

    /// Writes every record of the report and returns the run directory
    pub fn write(&self, report: &SimulationReport) -> AppResult<PathBuf> {
        let dir = self.run_dir(report.started_at);
        fs::create_dir_all(&dir)?;

        write_jsonl(&dir.join("onboarding.jsonl"), &report.onboarding)?;
        write_jsonl(&dir.join("profiles.jsonl"), &report.profiles)?;
        write_jsonl(&dir.join("recommendations.jsonl"), &report.rounds)?;

        let summary = RunSummary::from(report);
        let mut out = BufWriter::new(File::create(dir.join("summary.json"))?);
        serde_json::to_writer_pretty(&mut out, &summary)?;
        out.flush()?;

        tracing::info!(path = %dir.display(), "Results written");
        Ok(dir)
    }
}

fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> AppResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_dir_name() {
        let writer = ResultsWriter::new("results");
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            writer.run_dir(at),
            PathBuf::from("results").join("run_20240309_140507")
        );
    }

    #[test]
    fn test_write_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultsWriter::new(dir.path());
        let report = SimulationReport {
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            seed: 1,
            recommendations_per_agent: 5,
            onboarding: Vec::new(),
            skipped_agents: Vec::new(),
            profiles: Vec::new(),
            rounds: Vec::new(),
        };

        let run = writer.write(&report).unwrap();
        for name in ["onboarding.jsonl", "profiles.jsonl", "recommendations.jsonl"] {
            assert_eq!(fs::read_to_string(run.join(name)).unwrap(), "");
        }

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(run.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["agents"], 0);
        assert_eq!(summary["skipped_agents"], 0);
        assert_eq!(summary["playlists_created"], 0);
        assert!(summary["average_recommendation_rating"].is_null());
    }
}
