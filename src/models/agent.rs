use chrono::{DateTime, Utc};
use rand::{distributions::WeightedIndex, prelude::Distribution, seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Song;

/// Weighted affinity of an agent for a genre
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenrePreference {
    pub genre: String,
    /// In [0, 1]
    pub weight: f64,
}

/// Range of an audio attribute an agent enjoys, with the weight it carries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioFeaturePreference {
    pub feature_name: String,
    pub preferred_range: (f64, f64),
    pub weight: f64,
}

impl AudioFeaturePreference {
    fn new(feature_name: &str, min: f64, max: f64, weight: f64) -> Self {
        Self {
            feature_name: feature_name.to_string(),
            preferred_range: (min, max),
            weight,
        }
    }

    fn matches(&self, value: f64) -> bool {
        let (min, max) = self.preferred_range;
        min <= value && value <= max
    }
}

/// Probabilistic listening habits of an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListeningBehavior {
    /// Minutes, 10 to 180
    pub avg_session_length: u32,
    pub skip_probability: f64,
    pub rating_probability: f64,
    pub playlist_creation_frequency: f64,
}

/// A playlist created by an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    pub playlist_id: String,
    pub name: String,
    pub description: String,
    pub songs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub genre_focus: Option<String>,
}

/// How an agent picks the theme of a new playlist
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistKind {
    Genre,
    Mixed,
}

/// A simulated listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MusicAgent {
    pub agent_id: String,
    pub archetype: String,
    pub genre_preferences: Vec<GenrePreference>,
    pub feature_preferences: Vec<AudioFeaturePreference>,
    pub behavior: ListeningBehavior,
    pub active_hours: Vec<u32>,
    pub playlists: Vec<Playlist>,
}

impl MusicAgent {
    fn new(
        agent_id: impl Into<String>,
        archetype: impl Into<String>,
        genre_preferences: Vec<GenrePreference>,
        feature_preferences: Vec<AudioFeaturePreference>,
        behavior: ListeningBehavior,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            archetype: archetype.into(),
            genre_preferences,
            feature_preferences,
            behavior,
            active_hours: (9..23).collect(),
            playlists: Vec::new(),
        }
    }

    /// Agent built around one primary genre plus a few secondary ones
    pub fn genre_focused(agent_id: &str, primary_genre: &str, secondary_genres: &[&str]) -> Self {
        let genre_preferences = std::iter::once(GenrePreference {
            genre: primary_genre.to_string(),
            weight: 0.8,
        })
        .chain(secondary_genres.iter().map(|g| GenrePreference {
            genre: g.to_string(),
            weight: 0.4,
        }))
        .collect();

        Self::new(
            agent_id,
            format!("{}_enthusiast", primary_genre),
            genre_preferences,
            vec![
                AudioFeaturePreference::new("danceability", 0.6, 1.0, 0.7),
                AudioFeaturePreference::new("energy", 0.5, 0.9, 0.6),
                AudioFeaturePreference::new("valence", 0.4, 0.8, 0.5),
            ],
            ListeningBehavior {
                avg_session_length: 45,
                skip_probability: 0.3,
                rating_probability: 0.2,
                playlist_creation_frequency: 0.1,
            },
        )
    }

    pub fn pop(agent_id: &str) -> Self {
        Self::genre_focused(agent_id, "pop", &["dance", "electronic"])
    }

    pub fn classical(agent_id: &str) -> Self {
        Self::new(
            agent_id,
            "classical_connoisseur",
            vec![
                GenrePreference {
                    genre: "classical".to_string(),
                    weight: 0.9,
                },
                GenrePreference {
                    genre: "orchestra".to_string(),
                    weight: 0.7,
                },
            ],
            vec![
                AudioFeaturePreference::new("acousticness", 0.8, 1.0, 0.9),
                AudioFeaturePreference::new("instrumentalness", 0.8, 1.0, 0.8),
            ],
            ListeningBehavior {
                avg_session_length: 60,
                skip_probability: 0.1,
                rating_probability: 0.4,
                playlist_creation_frequency: 0.05,
            },
        )
    }

    pub fn general(agent_id: &str) -> Self {
        Self::new(
            agent_id,
            "general_explorer",
            ["indie", "experimental", "world", "jazz", "electronic"]
                .iter()
                .map(|genre| GenrePreference {
                    genre: genre.to_string(),
                    weight: 0.4,
                })
                .collect(),
            vec![
                AudioFeaturePreference::new("acousticness", 0.2, 0.8, 0.5),
                AudioFeaturePreference::new("energy", 0.3, 0.7, 0.5),
                AudioFeaturePreference::new("valence", 0.3, 0.7, 0.5),
            ],
            ListeningBehavior {
                avg_session_length: 90,
                skip_probability: 0.4,
                rating_probability: 0.3,
                playlist_creation_frequency: 0.2,
            },
        )
    }

    fn genre_weight(&self, genre: &str) -> Option<f64> {
        self.genre_preferences
            .iter()
            .find(|gp| gp.genre == genre)
            .map(|gp| gp.weight)
    }

    /// Decides whether the agent would be interested in a song
    pub fn should_listen(&self, song: &Song) -> bool {
        let mut score = 0.0;
        let mut total_weight = 0.0;

        if let Some(weight) = self.genre_weight(&song.genre) {
            score += weight;
            total_weight += 1.0;
        }

        for pref in &self.feature_preferences {
            if let Some(value) = song.features.get(&pref.feature_name) {
                if pref.matches(value) {
                    score += pref.weight;
                }
                total_weight += 1.0;
            }
        }

        total_weight > 0.0 && score / total_weight > 0.6
    }

    /// Rates a song from 1 to 5, or `None` when the agent does not bother rating.
    ///
    /// Ratings are polarized: each matching feature range or genre pushes the
    /// score up by twice its weight, each miss pulls it down.
    pub fn generate_rating<R: Rng + ?Sized>(&self, song: &Song, rng: &mut R) -> Option<u8> {
        if rng.gen::<f64>() > self.behavior.rating_probability {
            return None;
        }

        let base_score = 3.0;
        let mut adjustments = 0.0;
        let mut count = 0u32;

        if let Some(weight) = self.genre_weight(&song.genre) {
            adjustments += 2.0 * weight;
            count += 1;
        }

        for pref in &self.feature_preferences {
            if let Some(value) = song.features.get(&pref.feature_name) {
                if pref.matches(value) {
                    adjustments += 2.0 * pref.weight;
                } else {
                    adjustments -= 2.0 * pref.weight;
                }
                count += 1;
            }
        }

        if count == 0 {
            return Some(base_score as u8);
        }

        let final_score = (base_score + adjustments / count as f64).round();
        Some(final_score.clamp(1.0, 5.0) as u8)
    }

    /// Whether the agent skips a song it is played
    pub fn skips<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen::<f64>() < self.behavior.skip_probability
    }

    /// Spotify-style playlist name drawn from the archetype's templates
    pub fn generate_playlist_name<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        const TIMES: [&str; 4] = ["Morning", "Evening", "Late Night", "Weekend"];
        const MOODS: [&str; 5] = ["Chill", "Energetic", "Focus", "Relaxing", "Upbeat"];
        const ACTIVITIES: [&str; 4] = ["Working", "Studying", "Workout", "Drive"];

        let templates: &[&str] = match self.archetype.as_str() {
            "classical_connoisseur" => &[
                "Classical {mood}",
                "Orchestra Essentials",
                "Sophisticated {time}",
                "{mood} Orchestral Mix",
            ],
            "general_explorer" => &[
                "Eclectic {mood} Mix",
                "Genre-Bending {activity}",
                "Global Sounds",
                "Discovery {time}",
            ],
            _ => &[
                "{mood} {time} Mix",
                "{activity} Essentials",
                "My {mood} Playlist",
                "{time} {activity} Mix",
            ],
        };

        let template = templates.choose(rng).copied().unwrap_or("My Mix");
        let time = TIMES.choose(rng).copied().unwrap_or_default();
        let mood = MOODS.choose(rng).copied().unwrap_or_default();
        let activity = ACTIVITIES.choose(rng).copied().unwrap_or_default();

        template
            .replace("{time}", time)
            .replace("{mood}", mood)
            .replace("{activity}", activity)
    }

    /// Maybe creates a playlist out of the songs the agent would listen to.
    ///
    /// Gated by `playlist_creation_frequency`; returns `None` when the agent
    /// passes or when none of `available_songs` suits it.
    pub fn create_playlist<R: Rng + ?Sized>(
        &mut self,
        available_songs: &[Song],
        kind: PlaylistKind,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<Playlist> {
        if rng.gen::<f64>() > self.behavior.playlist_creation_frequency {
            return None;
        }

        let genres: Vec<&str> = self
            .genre_preferences
            .iter()
            .map(|gp| gp.genre.as_str())
            .collect();
        let weights: Vec<f64> = self.genre_preferences.iter().map(|gp| gp.weight).collect();

        let (name, description, genre_focus) = match kind {
            PlaylistKind::Genre => {
                let chosen = weighted_choice(&genres, &weights, rng)?.to_string();
                let volume = self
                    .playlists
                    .iter()
                    .filter(|p| p.genre_focus.as_deref() == Some(chosen.as_str()))
                    .count()
                    + 1;
                (
                    format!("My {} Mix Vol.{}", title_case(&chosen), volume),
                    format!("A curated collection of {} tracks", chosen),
                    chosen,
                )
            }
            PlaylistKind::Mixed => {
                let mut options = genres.clone();
                options.push("mixed");
                let mut option_weights = weights.clone();
                option_weights.push(0.3);
                let focus = weighted_choice(&options, &option_weights, rng)?.to_string();
                (
                    self.generate_playlist_name(rng),
                    "A personalized mix based on my favorite genres".to_string(),
                    focus,
                )
            }
        };

        let suitable: Vec<&Song> = available_songs
            .iter()
            .filter(|song| self.should_listen(song))
            .collect();
        if suitable.is_empty() {
            return None;
        }

        let size = rng.gen_range(10..=30).min(suitable.len());
        let songs = suitable
            .choose_multiple(rng, size)
            .map(|song| song.id.clone())
            .collect();

        let id = Uuid::from_u128(rng.gen()).simple().to_string();
        let playlist = Playlist {
            playlist_id: format!("pl_{}", &id[..8]),
            name,
            description,
            songs,
            created_at: now,
            genre_focus: Some(genre_focus),
        };
        self.playlists.push(playlist.clone());
        Some(playlist)
    }
}

fn weighted_choice<'a, R: Rng + ?Sized>(
    options: &[&'a str],
    weights: &[f64],
    rng: &mut R,
) -> Option<&'a str> {
    let dist = WeightedIndex::new(weights).ok()?;
    options.get(dist.sample(rng)).copied()
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize = true;
    for c in s.chars() {
        if capitalize {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        capitalize = !c.is_alphanumeric();
    }
    out
}
