use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::{
    error::AppResult,
    models::{
        InteractionKind, MusicAgent, Playlist, PlaylistKind, ProfileSummary,
        RecommendationResult, Song, LIKE_THRESHOLD,
    },
    services::{
        onboarding::{onboard_agent, OnboardingRecord},
        recommendations::RecommenderManager,
    },
};

/// The five listeners every batch run starts with
pub fn default_agents() -> Vec<MusicAgent> {
    vec![
        MusicAgent::pop("pop_enthusiast"),
        MusicAgent::classical("classical_lover"),
        MusicAgent::genre_focused("rock_indie_mix", "rock", &["indie", "pop"]),
        MusicAgent::genre_focused("jazz_electronic_mix", "jazz", &["electronic", "ambient"]),
        MusicAgent::genre_focused("hiphop_rnb_mix", "hip-hop", &["r-b", "pop"]),
    ]
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationOptions {
    pub recommendations: usize,
    pub seed: u64,
    pub now: DateTime<Utc>,
}

/// An agent's reaction to one recommended song
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationRating {
    pub song_id: String,
    pub rating: Option<u8>,
}

/// One recommendation round for one agent
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationRound {
    pub agent_id: String,
    pub round: u32,
    pub result: RecommendationResult,
    pub ratings: Vec<RecommendationRating>,
    pub playlist: Option<Playlist>,
}

/// An agent left out of a run because onboarding failed
#[derive(Debug, Clone, Serialize)]
pub struct SkippedAgent {
    pub agent_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub started_at: DateTime<Utc>,
    pub seed: u64,
    pub recommendations_per_agent: usize,
    pub onboarding: Vec<OnboardingRecord>,
    pub skipped_agents: Vec<SkippedAgent>,
    pub profiles: Vec<ProfileSummary>,
    pub rounds: Vec<RecommendationRound>,
}

impl SimulationReport {
    pub fn playlists_created(&self) -> usize {
        self.rounds.iter().filter(|r| r.playlist.is_some()).count()
    }

    /// Mean rating given to recommended songs, if any were rated
    pub fn average_recommendation_rating(&self) -> Option<f64> {
        let ratings: Vec<f64> = self
            .rounds
            .iter()
            .flat_map(|r| r.ratings.iter().filter_map(|x| x.rating.map(f64::from)))
            .collect();
        (!ratings.is_empty()).then(|| ratings.iter().sum::<f64>() / ratings.len() as f64)
    }
}

/// Onboards every agent, then runs one recommendation round for each.
///
/// Agents that cannot be onboarded are logged and skipped. Rated
/// recommendations are fed back into the agent's profile and songs rated at
/// or above the like threshold seed a playlist. All randomness comes from
/// `options.seed`.
pub fn run_simulation(
    manager: &mut RecommenderManager,
    agents: &mut [MusicAgent],
    options: SimulationOptions,
) -> AppResult<SimulationReport> {
    let mut rng = StdRng::seed_from_u64(options.seed);

    tracing::info!(
        agents = agents.len(),
        seed = options.seed,
        recommendations = options.recommendations,
        "Starting simulation"
    );

    // 1. Onboarding phase
    let mut onboarding = Vec::with_capacity(agents.len());
    let mut skipped_agents = Vec::new();
    for agent in agents.iter() {
        match onboard_agent(manager, agent, options.now, &mut rng) {
            Ok(record) => onboarding.push(record),
            Err(e) => {
                tracing::warn!(agent_id = %agent.agent_id, error = %e, "Skipping agent");
                skipped_agents.push(SkippedAgent {
                    agent_id: agent.agent_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    // 2. Recommendation phase
    let mut rounds = Vec::with_capacity(onboarding.len());
    for agent in agents.iter_mut() {
        if skipped_agents.iter().any(|s| s.agent_id == agent.agent_id) {
            continue;
        }

        let result =
            manager.get_recommendations(&agent.agent_id, options.recommendations, options.now)?;

        let mut ratings = Vec::with_capacity(result.len());
        let mut liked: Vec<Song> = Vec::new();
        for song in result.songs() {
            let rating = agent.generate_rating(song, &mut rng);
            if rating.is_some_and(|r| r >= LIKE_THRESHOLD) {
                liked.push(song.clone());
            }
            ratings.push(RecommendationRating {
                song_id: song.id.clone(),
                rating,
            });
        }

        for rated in ratings.iter().filter(|r| r.rating.is_some()) {
            manager.add_interaction(
                &agent.agent_id,
                &rated.song_id,
                rated.rating,
                false,
                InteractionKind::Recommendation,
                options.now,
            )?;
        }

        let playlist = if liked.is_empty() {
            None
        } else {
            agent.create_playlist(&liked, PlaylistKind::Genre, options.now, &mut rng)
        };
        if let Some(playlist) = &playlist {
            tracing::info!(
                agent_id = %agent.agent_id,
                playlist = %playlist.name,
                songs = playlist.songs.len(),
                "Playlist created"
            );
        }

        rounds.push(RecommendationRound {
            agent_id: agent.agent_id.clone(),
            round: 1,
            result,
            ratings,
            playlist,
        });
    }

    let profiles = agents
        .iter()
        .filter_map(|agent| manager.profile(&agent.agent_id).map(|p| p.summary()))
        .collect();

    tracing::info!(rounds = rounds.len(), "Simulation complete");

    Ok(SimulationReport {
        started_at: options.now,
        seed: options.seed,
        recommendations_per_agent: options.recommendations,
        onboarding,
        skipped_agents,
        profiles,
        rounds,
    })
}
