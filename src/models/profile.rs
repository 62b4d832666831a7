use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Song, AUDIO_FEATURES};
use crate::error::{AppError, AppResult};

/// Ratings at or above this count as a like
pub const LIKE_THRESHOLD: u8 = 4;

/// Where an interaction came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Onboarding,
    Listen,
    Recommendation,
}

/// A single agent reaction to a song
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub song_id: String,
    pub rating: Option<u8>,
    pub skipped: bool,
    pub timestamp: DateTime<Utc>,
    pub kind: InteractionKind,
}

/// Running sum of the ratings given to a genre
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RatingStats {
    pub total: f64,
    pub count: u32,
}

impl RatingStats {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }
}

/// Latest explicit rating of one song, kept with what the profile needs to
/// rebuild its preference signal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatedSong {
    pub rating: u8,
    pub genre: Option<String>,
    pub encoded: Option<Vec<f64>>,
}

/// Accumulated preference signal of one agent.
///
/// Created by onboarding and only ever extended afterwards. Interactions are
/// appended; genre statistics, the preference vector and the liked count are
/// derived from the latest rating of each song.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub agent_id: String,
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub rated: BTreeMap<String, RatedSong>,
    pub genre_ratings: BTreeMap<String, RatingStats>,
    /// Mean encoded feature vector of liked songs
    pub preference_vector: Vec<f64>,
    pub liked_count: u32,
    pub onboarded_at: DateTime<Utc>,
}

/// Flattened view of a profile for dumps and API responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileSummary {
    pub agent_id: String,
    pub genre_preferences: BTreeMap<String, f64>,
    pub feature_preferences: BTreeMap<String, f64>,
    pub liked_count: u32,
    pub interaction_count: usize,
    pub onboarded_at: DateTime<Utc>,
}

impl UserProfile {
    /// Creates an empty profile whose preference vector sits at the center of a
    /// `dimensions`-wide unit feature space
    pub fn new(agent_id: impl Into<String>, dimensions: usize, onboarded_at: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            interactions: Vec::new(),
            rated: BTreeMap::new(),
            genre_ratings: BTreeMap::new(),
            preference_vector: vec![0.5; dimensions],
            liked_count: 0,
            onboarded_at,
        }
    }

    /// Records an interaction; a rating replaces any earlier rating of the song.
    ///
    /// `encoded` is the song's feature vector; it must match the width of the
    /// preference vector.
    pub fn record(
        &mut self,
        interaction: Interaction,
        song: Option<&Song>,
        encoded: Option<&[f64]>,
    ) -> AppResult<()> {
        if let Some(features) = encoded {
            if features.len() != self.preference_vector.len() {
                return Err(AppError::DimensionMismatch {
                    expected: self.preference_vector.len(),
                    found: features.len(),
                });
            }
        }

        if let Some(rating) = interaction.rating {
            self.rated.insert(
                interaction.song_id.clone(),
                RatedSong {
                    rating,
                    genre: song.map(|s| s.genre.clone()),
                    encoded: encoded.map(<[f64]>::to_vec),
                },
            );
            self.rebuild();
        }

        self.interactions.push(interaction);
        Ok(())
    }

    fn rebuild(&mut self) {
        let dimensions = self.preference_vector.len();
        let mut totals = vec![0.0; dimensions];
        let mut liked = 0u32;
        self.genre_ratings.clear();

        for rated in self.rated.values() {
            if let Some(genre) = &rated.genre {
                let stats = self.genre_ratings.entry(genre.clone()).or_default();
                stats.total += rated.rating as f64;
                stats.count += 1;
            }

            if rated.rating >= LIKE_THRESHOLD {
                if let Some(features) = &rated.encoded {
                    for (total, value) in totals.iter_mut().zip(features) {
                        *total += value;
                    }
                    liked += 1;
                }
            }
        }

        self.liked_count = liked;
        self.preference_vector = if liked == 0 {
            vec![0.5; dimensions]
        } else {
            totals.into_iter().map(|t| t / liked as f64).collect()
        };
    }

    /// Latest explicit rating per song
    pub fn ratings(&self) -> BTreeMap<&str, f64> {
        self.rated
            .iter()
            .map(|(song_id, rated)| (song_id.as_str(), rated.rating as f64))
            .collect()
    }

    /// Mean rating of a genre, if the agent rated any of its songs
    pub fn genre_preference(&self, genre: &str) -> Option<f64> {
        self.genre_ratings.get(genre).and_then(RatingStats::mean)
    }

    pub fn genre_preferences(&self) -> BTreeMap<String, f64> {
        self.genre_ratings
            .iter()
            .filter_map(|(genre, stats)| stats.mean().map(|m| (genre.clone(), m)))
            .collect()
    }

    /// Songs the agent interacted with strictly after `cutoff`
    pub fn songs_since(&self, cutoff: DateTime<Utc>) -> HashSet<&str> {
        self.interactions
            .iter()
            .filter(|i| i.timestamp > cutoff)
            .map(|i| i.song_id.as_str())
            .collect()
    }

    pub fn summary(&self) -> ProfileSummary {
        let feature_preferences = AUDIO_FEATURES
            .iter()
            .zip(&self.preference_vector)
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        ProfileSummary {
            agent_id: self.agent_id.clone(),
            genre_preferences: self.genre_preferences(),
            feature_preferences,
            liked_count: self.liked_count,
            interaction_count: self.interactions.len(),
            onboarded_at: self.onboarded_at,
        }
    }
}
