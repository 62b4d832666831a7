use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{Interaction, InteractionKind, MusicAgent, ProfileSummary, Song, UserProfile},
    services::{catalog::Catalog, recommendations::RecommenderManager},
};

/// Songs shown to a new agent
pub const ONBOARDING_SONGS: usize = 5;

/// Spacing between onboarding listens
const LISTEN_SPACING_MINUTES: i64 = 30;

/// One song played during onboarding and the agent's reaction to it
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingRating {
    pub song: Song,
    pub rating: Option<u8>,
    pub skipped: bool,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of onboarding one agent
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingRecord {
    pub agent_id: String,
    pub archetype: String,
    pub ratings: Vec<OnboardingRating>,
    pub skip_frequency: f64,
    pub average_rating: Option<f64>,
    pub profile: ProfileSummary,
}

/// Picks the onboarding songs for an agent.
///
/// The two most popular songs of each of the agent's first two genres, then
/// the most popular song of the catalog's last three years. Duplicates are
/// dropped and the list is capped at `ONBOARDING_SONGS`.
pub fn select_onboarding_songs<'a>(catalog: &'a Catalog, agent: &MusicAgent) -> Vec<&'a Song> {
    let mut selected: Vec<&Song> = Vec::with_capacity(ONBOARDING_SONGS);

    for preference in agent.genre_preferences.iter().take(2) {
        for song in catalog.top_songs_by_genre(&preference.genre, 2) {
            push_unique(&mut selected, song);
        }
    }

    if let Some((_, latest)) = catalog.year_range() {
        for song in catalog.popular_songs_in_timeframe(latest - 2, latest, 1) {
            push_unique(&mut selected, song);
        }
    }

    selected.truncate(ONBOARDING_SONGS);
    selected
}

fn push_unique<'a>(selected: &mut Vec<&'a Song>, song: &'a Song) {
    if !selected.iter().any(|s| s.id == song.id) {
        selected.push(song);
    }
}

/// Onboards an agent: plays the selection, collects reactions and registers a profile.
///
/// Listens are spaced thirty minutes apart, the last one at `now`.
pub fn onboard_agent<R: Rng + ?Sized>(
    manager: &mut RecommenderManager,
    agent: &MusicAgent,
    now: DateTime<Utc>,
    rng: &mut R,
) -> AppResult<OnboardingRecord> {
    if manager.has_profile(&agent.agent_id) {
        return Err(AppError::Conflict(format!(
            "Agent {} is already onboarded",
            agent.agent_id
        )));
    }

    let catalog = manager.catalog().clone();
    let songs = select_onboarding_songs(&catalog, agent);
    if songs.is_empty() {
        return Err(AppError::EmptyCatalog);
    }

    let mut profile = UserProfile::new(&agent.agent_id, manager.dimensions(), now);
    let mut ratings = Vec::with_capacity(songs.len());
    let last = songs.len() as i64 - 1;

    for (position, song) in songs.into_iter().enumerate() {
        let rating = agent.generate_rating(song, rng);
        let skipped = agent.skips(rng);
        let timestamp = now - Duration::minutes(LISTEN_SPACING_MINUTES * (last - position as i64));

        let encoded = manager.encoded(&song.id);
        profile.record(
            Interaction {
                song_id: song.id.clone(),
                rating,
                skipped,
                timestamp,
                kind: InteractionKind::Onboarding,
            },
            Some(song),
            encoded.as_deref(),
        )?;

        ratings.push(OnboardingRating {
            song: song.clone(),
            rating,
            skipped,
            timestamp,
        });
    }

    let skips = ratings.iter().filter(|r| r.skipped).count();
    let given: Vec<f64> = ratings.iter().filter_map(|r| r.rating.map(f64::from)).collect();
    let skip_frequency = skips as f64 / ratings.len() as f64;
    let average_rating = (!given.is_empty()).then(|| given.iter().sum::<f64>() / given.len() as f64);

    let summary = profile.summary();
    manager.insert_profile(profile)?;

    tracing::info!(
        agent_id = %agent.agent_id,
        songs = ratings.len(),
        rated = given.len(),
        skip_frequency,
        "Agent onboarded"
    );

    Ok(OnboardingRecord {
        agent_id: agent.agent_id.clone(),
        archetype: agent.archetype.clone(),
        ratings,
        skip_frequency,
        average_rating,
        profile: summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::song::test_song;
    use crate::services::{encoder::FeatureEncoding, recommendations::RecommenderSettings};
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::Arc;

    fn song(id: &str, genre: &str, popularity: u32, year: i32) -> Song {
        let mut song = test_song(id, genre, [0.7, 0.7, 0.2, 0.6, 120.0]);
        song.popularity = popularity;
        song.release_year = Some(year);
        song
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::from_songs(vec![
                song("r1", "rock", 70, 2010),
                song("r2", "rock", 90, 2012),
                song("r3", "rock", 40, 2015),
                song("i1", "indie", 60, 2001),
                song("i2", "indie", 65, 2003),
                song("j1", "jazz", 99, 2020),
                song("j2", "jazz", 10, 2019),
            ])
            .unwrap(),
        )
    }

    fn manager() -> RecommenderManager {
        RecommenderManager::new(catalog(), FeatureEncoding::MinMax, RecommenderSettings::default())
            .unwrap()
    }

    #[test]
    fn test_selection_order() {
        let catalog = catalog();
        let agent = MusicAgent::genre_focused("a", "rock", &["indie", "pop"]);
        let ids: Vec<&str> = select_onboarding_songs(&catalog, &agent)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["r2", "r1", "i2", "i1", "j1"]);
    }

    #[test]
    fn test_selection_drops_duplicates() {
        let catalog = catalog();
        let agent = MusicAgent::genre_focused("a", "jazz", &["rock"]);
        let ids: Vec<&str> = select_onboarding_songs(&catalog, &agent)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["j1", "j2", "r2", "r1"]);
    }

    #[test]
    fn test_onboarding_builds_profile() {
        let mut manager = manager();
        let agent = MusicAgent::genre_focused("a", "rock", &["indie"]);
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);

        let record = onboard_agent(&mut manager, &agent, now, &mut rng).unwrap();
        assert_eq!(record.ratings.len(), 5);
        assert_eq!(record.ratings.last().unwrap().timestamp, now);
        assert_eq!(record.ratings[0].timestamp, now - Duration::minutes(120));

        let profile = manager.profile("a").unwrap();
        assert_eq!(profile.interactions.len(), 5);
        assert!(profile
            .interactions
            .iter()
            .all(|i| i.kind == InteractionKind::Onboarding));
        assert_eq!(record.profile.interaction_count, 5);
    }

    #[test]
    fn test_onboarding_is_deterministic() {
        let agent = MusicAgent::pop("p");
        let now = Utc::now();

        let mut first = manager();
        let a = onboard_agent(&mut first, &agent, now, &mut StdRng::seed_from_u64(3)).unwrap();
        let mut second = manager();
        let b = onboard_agent(&mut second, &agent, now, &mut StdRng::seed_from_u64(3)).unwrap();

        let reactions = |r: &OnboardingRecord| {
            r.ratings
                .iter()
                .map(|x| (x.song.id.clone(), x.rating, x.skipped))
                .collect::<Vec<_>>()
        };
        assert_eq!(reactions(&a), reactions(&b));
    }

    #[test]
    fn test_second_onboarding_conflicts() {
        let mut manager = manager();
        let agent = MusicAgent::classical("c");
        let mut rng = StdRng::seed_from_u64(1);
        onboard_agent(&mut manager, &agent, Utc::now(), &mut rng).unwrap();

        let again = onboard_agent(&mut manager, &agent, Utc::now(), &mut rng);
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }
}
