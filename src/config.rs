use serde::Deserialize;

use crate::services::{encoder::FeatureEncoding, scoring::SimilarityMetric};

/// Longest accepted recency window, ten years of hours
pub const MAX_RECENT_WINDOW_HOURS: i64 = 10 * 366 * 24;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Path to the song catalog CSV
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Directory that simulation runs are dumped into
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Weight of the content-based list when combining recommendations
    #[serde(default = "default_content_weight")]
    pub content_weight: f64,

    /// Weight of the collaborative list when combining recommendations
    #[serde(default = "default_collab_weight")]
    pub collab_weight: f64,

    /// Multiplier for the genre bonus added to content scores
    #[serde(default = "default_genre_weight")]
    pub genre_weight: f64,

    /// Songs interacted with inside this window are not recommended again
    #[serde(default = "default_recent_window_hours")]
    pub recent_window_hours: i64,

    /// Recommendation count used when a request does not specify one
    #[serde(default = "default_recommendations")]
    pub default_recommendations: usize,

    #[serde(default)]
    pub similarity_metric: SimilarityMetric,

    #[serde(default)]
    pub feature_encoding: FeatureEncoding,

    /// Seed for every random decision taken by agents
    #[serde(default = "default_simulation_seed")]
    pub simulation_seed: u64,
}

fn default_catalog_path() -> String {
    "data/spotify_songs.csv".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_content_weight() -> f64 {
    0.7
}

fn default_collab_weight() -> f64 {
    0.3
}

fn default_genre_weight() -> f64 {
    1.0
}

fn default_recent_window_hours() -> i64 {
    24
}

fn default_recommendations() -> usize {
    5
}

fn default_simulation_seed() -> u64 {
    42
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            results_dir: default_results_dir(),
            host: default_host(),
            port: default_port(),
            content_weight: default_content_weight(),
            collab_weight: default_collab_weight(),
            genre_weight: default_genre_weight(),
            recent_window_hours: default_recent_window_hours(),
            default_recommendations: default_recommendations(),
            similarity_metric: SimilarityMetric::default(),
            feature_encoding: FeatureEncoding::default(),
            simulation_seed: default_simulation_seed(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("CONTENT_WEIGHT", self.content_weight),
            ("COLLAB_WEIGHT", self.collab_weight),
            ("GENRE_WEIGHT", self.genre_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{} must be a non-negative number, got {}", name, value);
            }
        }

        if !(0..=MAX_RECENT_WINDOW_HOURS).contains(&self.recent_window_hours) {
            anyhow::bail!(
                "RECENT_WINDOW_HOURS must be between 0 and {}, got {}",
                MAX_RECENT_WINDOW_HOURS,
                self.recent_window_hours
            );
        }

        if self.default_recommendations == 0 {
            anyhow::bail!("DEFAULT_RECOMMENDATIONS must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.content_weight, 0.7);
        assert_eq!(config.collab_weight, 0.3);
        assert_eq!(config.similarity_metric, SimilarityMetric::Cosine);
        assert_eq!(config.feature_encoding, FeatureEncoding::MinMax);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let config = Config {
            collab_weight: -0.1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_recommendations_rejected() {
        let config = Config {
            default_recommendations: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recent_window_bounds() {
        for hours in [-1, MAX_RECENT_WINDOW_HOURS + 1, 100_000_000_000, i64::MAX] {
            let config = Config {
                recent_window_hours: hours,
                ..Config::default()
            };
            assert!(config.validate().is_err(), "{} hours accepted", hours);
        }

        let config = Config {
            recent_window_hours: MAX_RECENT_WINDOW_HOURS,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_from_pairs() {
        let vars = vec![
            ("PORT".to_string(), "8080".to_string()),
            ("SIMILARITY_METRIC".to_string(), "inverse_distance".to_string()),
            ("FEATURE_ENCODING".to_string(), "raw".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.similarity_metric, SimilarityMetric::InverseDistance);
        assert_eq!(config.feature_encoding, FeatureEncoding::Raw);
        assert_eq!(config.catalog_path, "data/spotify_songs.csv");
    }
}
