use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::{Config, MAX_RECENT_WINDOW_HOURS},
    error::{AppError, AppResult},
    models::{
        Interaction, InteractionKind, RecommendationEntry, RecommendationResult,
        RecommendationSource, UserProfile,
    },
    services::{
        catalog::Catalog,
        collaborative::collaborative_scores,
        encoder::{build_encoder, FeatureEncoder, FeatureEncoding, FeatureMatrix},
        ranker::{self, Ranked},
        scoring::{content_scores, GenreBonus, SimilarityMetric},
    },
};

/// Tunables for combining content and collaborative lists
#[derive(Debug, Clone)]
pub struct RecommenderSettings {
    pub content_weight: f64,
    pub collab_weight: f64,
    pub genre_weight: f64,
    pub recent_window: Duration,
    pub metric: SimilarityMetric,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            content_weight: 0.7,
            collab_weight: 0.3,
            genre_weight: 1.0,
            recent_window: Duration::hours(24),
            metric: SimilarityMetric::Cosine,
        }
    }
}

impl TryFrom<&Config> for RecommenderSettings {
    type Error = AppError;

    fn try_from(config: &Config) -> AppResult<Self> {
        let recent_window = Some(config.recent_window_hours)
            .filter(|hours| (0..=MAX_RECENT_WINDOW_HOURS).contains(hours))
            .and_then(Duration::try_hours)
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Recent window of {} hours is out of range",
                    config.recent_window_hours
                ))
            })?;

        Ok(Self {
            content_weight: config.content_weight,
            collab_weight: config.collab_weight,
            genre_weight: config.genre_weight,
            recent_window,
            metric: config.similarity_metric,
        })
    }
}

/// Produces recommendations from a catalog and the profiles of onboarded agents
///
/// Owns the encoded catalog and every profile. Content-based and collaborative
/// lists are computed independently and merged with position-decayed weights.
pub struct RecommenderManager {
    catalog: Arc<Catalog>,
    encoder: Box<dyn FeatureEncoder>,
    features: FeatureMatrix,
    profiles: BTreeMap<String, UserProfile>,
    settings: RecommenderSettings,
}

impl RecommenderManager {
    pub fn new(
        catalog: Arc<Catalog>,
        encoding: FeatureEncoding,
        settings: RecommenderSettings,
    ) -> AppResult<Self> {
        let encoder = build_encoder(encoding, &catalog);
        Self::with_encoder(catalog, encoder, settings)
    }

    pub fn with_encoder(
        catalog: Arc<Catalog>,
        encoder: Box<dyn FeatureEncoder>,
        settings: RecommenderSettings,
    ) -> AppResult<Self> {
        let features = FeatureMatrix::encode_catalog(&catalog, encoder.as_ref())?;

        tracing::info!(
            songs = catalog.len(),
            dimensions = features.dimensions(),
            metric = ?settings.metric,
            "Recommender initialized"
        );

        Ok(Self {
            catalog,
            encoder,
            features,
            profiles: BTreeMap::new(),
            settings,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn settings(&self) -> &RecommenderSettings {
        &self.settings
    }

    pub fn dimensions(&self) -> usize {
        self.encoder.dimensions()
    }

    pub fn profile(&self, agent_id: &str) -> Option<&UserProfile> {
        self.profiles.get(agent_id)
    }

    pub fn profiles(&self) -> &BTreeMap<String, UserProfile> {
        &self.profiles
    }

    pub fn has_profile(&self, agent_id: &str) -> bool {
        self.profiles.contains_key(agent_id)
    }

    /// Encoded feature vector of a catalog song
    pub fn encoded(&self, song_id: &str) -> Option<Vec<f64>> {
        let index = self.catalog.index_of(song_id)?;
        self.features.row(index).map(|row| row.to_vec())
    }

    /// Registers the profile built for a freshly onboarded agent
    pub fn insert_profile(&mut self, profile: UserProfile) -> AppResult<()> {
        if self.profiles.contains_key(&profile.agent_id) {
            return Err(AppError::Conflict(format!(
                "Agent {} is already onboarded",
                profile.agent_id
            )));
        }
        if profile.preference_vector.len() != self.dimensions() {
            return Err(AppError::DimensionMismatch {
                expected: self.dimensions(),
                found: profile.preference_vector.len(),
            });
        }

        tracing::info!(
            agent_id = %profile.agent_id,
            interactions = profile.interactions.len(),
            liked = profile.liked_count,
            "Profile registered"
        );
        self.profiles.insert(profile.agent_id.clone(), profile);
        Ok(())
    }

    /// Records an agent's reaction to a song and folds it into the profile
    pub fn add_interaction(
        &mut self,
        agent_id: &str,
        song_id: &str,
        rating: Option<u8>,
        skipped: bool,
        kind: InteractionKind,
        timestamp: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(r) = rating {
            if !(1..=5).contains(&r) {
                return Err(AppError::InvalidInput(format!(
                    "Rating must be between 1 and 5, got {}",
                    r
                )));
            }
        }

        let index = self
            .catalog
            .index_of(song_id)
            .ok_or_else(|| AppError::NotFound(format!("Song {}", song_id)))?;
        let song = &self.catalog.songs()[index];
        let encoded = self.features.row(index).map(|row| row.to_vec());

        let profile = self
            .profiles
            .get_mut(agent_id)
            .ok_or_else(|| AppError::NotFound(format!("Profile for agent {}", agent_id)))?;

        profile.record(
            Interaction {
                song_id: song_id.to_string(),
                rating,
                skipped,
                timestamp,
                kind,
            },
            Some(song),
            encoded.as_deref(),
        )?;

        tracing::debug!(
            agent_id = %agent_id,
            song_id = %song_id,
            rating = ?rating,
            skipped,
            "Interaction recorded"
        );
        Ok(())
    }

    /// Ranked recommendations for an onboarded agent
    pub fn get_recommendations(
        &self,
        agent_id: &str,
        n: usize,
        now: DateTime<Utc>,
    ) -> AppResult<RecommendationResult> {
        let profile = self
            .profiles
            .get(agent_id)
            .ok_or_else(|| AppError::NotFound(format!("Profile for agent {}", agent_id)))?;

        if n == 0 {
            return Ok(RecommendationResult {
                agent_id: agent_id.to_string(),
                generated_at: now,
                entries: Vec::new(),
            });
        }

        // 1. Content-based list, skipping anything heard inside the window
        let content = self.content_list(profile, n, now)?;

        // 2. Collaborative list from agents with overlapping ratings
        let collaborative = collaborative_scores(agent_id, &self.profiles, &self.catalog, n);

        // 3. Merge with position-decayed weights
        let merged = combine(
            &content,
            &collaborative,
            self.settings.content_weight,
            self.settings.collab_weight,
        );

        tracing::info!(
            agent_id = %agent_id,
            content = content.len(),
            collaborative = collaborative.len(),
            merged = merged.len(),
            "Recommendations generated"
        );

        // 4. Final ranking
        let candidates = merged
            .iter()
            .map(|(index, (score, _))| Ranked {
                index: *index,
                score: *score,
            })
            .collect();
        let entries = ranker::rank(candidates, n)
            .into_iter()
            .filter_map(|ranked| {
                let song = self.catalog.song_at(ranked.index)?.clone();
                let source = merged.get(&ranked.index)?.1;
                Some(RecommendationEntry {
                    song,
                    score: ranked.score,
                    source,
                })
            })
            .collect();

        Ok(RecommendationResult {
            agent_id: agent_id.to_string(),
            generated_at: now,
            entries,
        })
    }

    fn content_list(
        &self,
        profile: &UserProfile,
        n: usize,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Ranked>> {
        let bonus = GenreBonus {
            catalog: &self.catalog,
            genre_ratings: &profile.genre_ratings,
            weight: self.settings.genre_weight,
        };
        let scores = content_scores(
            &profile.preference_vector,
            &self.features,
            self.settings.metric,
            Some(&bonus),
        )?;

        let cutoff = now
            .checked_sub_signed(self.settings.recent_window)
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Recent window {} reaches before the earliest representable time",
                    self.settings.recent_window
                ))
            })?;
        let recent = profile.songs_since(cutoff);
        Ok(ranker::top_n(&scores, scores.len())
            .into_iter()
            .filter(|ranked| {
                self.catalog
                    .song_at(ranked.index)
                    .map(|song| !recent.contains(song.id.as_str()))
                    .unwrap_or(false)
            })
            .take(n)
            .collect())
    }

    /// Most popular songs, for agents that have not been onboarded yet
    pub fn popular_fallback(
        &self,
        agent_id: &str,
        n: usize,
        now: DateTime<Utc>,
    ) -> RecommendationResult {
        let entries = self
            .catalog
            .popular_songs(n)
            .into_iter()
            .map(|song| RecommendationEntry {
                song: song.clone(),
                score: song.popularity as f64 / 100.0,
                source: RecommendationSource::Popularity,
            })
            .collect();

        tracing::info!(agent_id = %agent_id, "Serving popularity fallback");

        RecommendationResult {
            agent_id: agent_id.to_string(),
            generated_at: now,
            entries,
        }
    }

    /// Nearest neighbours of a song in encoded feature space
    pub fn similar_songs_by_features(
        &self,
        song_id: &str,
        n: usize,
    ) -> AppResult<Vec<RecommendationEntry>> {
        let seed_index = self
            .catalog
            .index_of(song_id)
            .ok_or_else(|| AppError::NotFound(format!("Song {}", song_id)))?;
        let seed = self
            .features
            .row(seed_index)
            .ok_or_else(|| AppError::Internal(format!("Missing features for {}", song_id)))?
            .to_vec();

        let mut scores = content_scores(&seed, &self.features, self.settings.metric, None)?;
        scores[seed_index] = f64::NAN;

        Ok(ranker::top_n(&scores, n.min(scores.len() - 1))
            .into_iter()
            .filter_map(|ranked| {
                Some(RecommendationEntry {
                    song: self.catalog.song_at(ranked.index)?.clone(),
                    score: ranked.score,
                    source: RecommendationSource::Content,
                })
            })
            .collect())
    }
}

/// Merges ranked lists: position `i` of a list of length `L` earns `weight * (1 - i / L)`
fn combine(
    content: &[Ranked],
    collaborative: &[Ranked],
    content_weight: f64,
    collab_weight: f64,
) -> BTreeMap<usize, (f64, RecommendationSource)> {
    let mut merged: BTreeMap<usize, (f64, RecommendationSource)> = BTreeMap::new();

    let lists = [
        (content, content_weight, RecommendationSource::Content),
        (collaborative, collab_weight, RecommendationSource::Collaborative),
    ];
    for (list, weight, source) in lists {
        let len = list.len() as f64;
        for (position, ranked) in list.iter().enumerate() {
            let score = weight * (1.0 - position as f64 / len);
            merged
                .entry(ranked.index)
                .and_modify(|(total, existing)| {
                    *total += score;
                    *existing = existing.merge(source);
                })
                .or_insert((score, source));
        }
    }

    merged
}
