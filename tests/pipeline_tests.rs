use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::Value;

use songrec_api::{
    models::InteractionKind,
    services::{
        catalog::Catalog,
        encoder::FeatureEncoding,
        recommendations::{RecommenderManager, RecommenderSettings},
        results::ResultsWriter,
        scoring::SimilarityMetric,
        simulation::{default_agents, run_simulation, SimulationOptions},
    },
};

const FIXTURE: &str = "tests/fixtures/songs.csv";

fn manager(encoding: FeatureEncoding, metric: SimilarityMetric) -> RecommenderManager {
    let report = Catalog::from_path(FIXTURE).unwrap();
    let settings = RecommenderSettings {
        metric,
        ..RecommenderSettings::default()
    };
    RecommenderManager::new(Arc::new(report.catalog), encoding, settings).unwrap()
}

fn options(seed: u64) -> SimulationOptions {
    SimulationOptions {
        recommendations: 5,
        seed,
        now: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

#[test]
fn test_fixture_loads_with_reported_problems() {
    let report = Catalog::from_path(FIXTURE).unwrap();
    assert_eq!(report.catalog.len(), 24);

    let lines: Vec<u64> = report.problems.iter().map(|p| p.line).collect();
    assert_eq!(lines, vec![12, 27]);

    let ids: HashSet<&str> = report.catalog.songs().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids.len(), report.catalog.len());
    assert_eq!(report.catalog.year_range(), Some((1971, 2019)));
}

#[test]
fn test_missing_catalog_is_fatal() {
    assert!(Catalog::from_path("tests/fixtures/nope.csv").is_err());
}

#[test]
fn test_simulation_writes_results() {
    let mut manager = manager(FeatureEncoding::MinMax, SimilarityMetric::Cosine);
    let mut agents = default_agents();
    let report = run_simulation(&mut manager, &mut agents, options(42)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let run_dir = ResultsWriter::new(dir.path()).write(&report).unwrap();
    assert!(run_dir.ends_with("run_20240501_120000"));

    let onboarding = fs::read_to_string(run_dir.join("onboarding.jsonl")).unwrap();
    assert_eq!(onboarding.lines().count(), 5);
    let first: Value = serde_json::from_str(onboarding.lines().next().unwrap()).unwrap();
    assert_eq!(first["agent_id"], "pop_enthusiast");

    let profiles = fs::read_to_string(run_dir.join("profiles.jsonl")).unwrap();
    assert_eq!(profiles.lines().count(), 5);

    let recommendations = fs::read_to_string(run_dir.join("recommendations.jsonl")).unwrap();
    for line in recommendations.lines() {
        let round: Value = serde_json::from_str(line).unwrap();
        let entries = round["result"]["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 5);
        let scores: Vec<f64> = entries.iter().map(|e| e["score"].as_f64().unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    let summary: Value =
        serde_json::from_str(&fs::read_to_string(run_dir.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["agents"], 5);
    assert_eq!(summary["total_recommendations"], 25);
    assert_eq!(summary["seed"], 42);
}

#[test]
fn test_simulation_is_reproducible() {
    let ranked = |seed: u64| {
        let mut manager = manager(FeatureEncoding::MinMax, SimilarityMetric::Cosine);
        let report = run_simulation(&mut manager, &mut default_agents(), options(seed)).unwrap();
        report
            .rounds
            .iter()
            .map(|round| {
                round
                    .result
                    .entries
                    .iter()
                    .map(|e| (e.song.id.clone(), e.score))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };

    assert_eq!(ranked(7), ranked(7));
}

#[test]
fn test_recommendations_skip_onboarding_songs() {
    let mut manager = manager(FeatureEncoding::MinMax, SimilarityMetric::InverseDistance);
    let report = run_simulation(&mut manager, &mut default_agents(), options(3)).unwrap();

    for (onboarding, round) in report.onboarding.iter().zip(&report.rounds) {
        let heard: HashSet<&str> = onboarding.ratings.iter().map(|r| r.song.id.as_str()).collect();
        assert!(round.result.songs().all(|s| !heard.contains(s.id.as_str())));
    }
}

#[test]
fn test_rated_recommendations_feed_profiles() {
    let mut manager = manager(FeatureEncoding::Raw, SimilarityMetric::Cosine);
    let report = run_simulation(&mut manager, &mut default_agents(), options(11)).unwrap();

    for round in &report.rounds {
        let rated = round.ratings.iter().filter(|r| r.rating.is_some()).count();
        let profile = manager.profile(&round.agent_id).unwrap();
        let recorded = profile
            .interactions
            .iter()
            .filter(|i| i.kind == InteractionKind::Recommendation)
            .count();
        assert_eq!(recorded, rated);
    }
}
