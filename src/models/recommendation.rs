use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Song;

/// Which strategy put a song into a recommendation list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Content,
    Collaborative,
    Both,
    Popularity,
}

impl RecommendationSource {
    pub fn merge(self, other: RecommendationSource) -> RecommendationSource {
        if self == other {
            self
        } else {
            RecommendationSource::Both
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationEntry {
    pub song: Song,
    pub score: f64,
    pub source: RecommendationSource,
}

/// Ranked songs for one agent at one point in time.
///
/// Entries are in non-increasing score order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    pub agent_id: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<RecommendationEntry>,
}

impl RecommendationResult {
    pub fn songs(&self) -> impl Iterator<Item = &Song> {
        self.entries.iter().map(|e| &e.song)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
