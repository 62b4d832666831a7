use serde::{Deserialize, Serialize};

/// Names of the audio attributes that make up a song's feature vector, in encoding order
pub const AUDIO_FEATURES: [&str; 5] = ["danceability", "energy", "acousticness", "valence", "tempo"];

/// Audio attributes of a song as published in the Spotify dataset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub acousticness: f64,
    pub valence: f64,
    /// Beats per minute, not normalized
    pub tempo: f64,
    #[serde(default)]
    pub instrumentalness: f64,
}

impl AudioFeatures {
    /// Looks up an attribute by its dataset column name
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "danceability" => Some(self.danceability),
            "energy" => Some(self.energy),
            "acousticness" => Some(self.acousticness),
            "valence" => Some(self.valence),
            "tempo" => Some(self.tempo),
            "instrumentalness" => Some(self.instrumentalness),
            _ => None,
        }
    }

    /// The encodable attributes in `AUDIO_FEATURES` order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.danceability,
            self.energy,
            self.acousticness,
            self.valence,
            self.tempo,
        ]
    }
}

/// A catalog entry. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    /// Spotify track id, unique within a catalog
    pub id: String,
    pub name: String,
    pub artist: String,
    pub genre: String,
    pub subgenre: String,
    pub release_year: Option<i32>,
    pub popularity: u32,
    pub duration_ms: u64,
    pub features: AudioFeatures,
}

impl Song {
    /// Whether the song was released within `years` of `year`
    pub fn released_near(&self, year: Option<i32>, years: i32) -> bool {
        match (self.release_year, year) {
            (Some(a), Some(b)) => (a - b).abs() <= years,
            _ => false,
        }
    }
}

/// Extracts the year from release dates like `2019-06-14`, `2012-01` or `1997`
pub fn parse_release_year(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if trimmed.len() < 4 || !trimmed.is_char_boundary(4) {
        return None;
    }
    trimmed[..4].parse::<i32>().ok().filter(|y| *y > 0)
}

#[cfg(test)]
pub(crate) fn test_song(id: &str, genre: &str, features: [f64; 5]) -> Song {
    Song {
        id: id.to_string(),
        name: format!("Song {}", id),
        artist: format!("Artist {}", id),
        genre: genre.to_string(),
        subgenre: String::new(),
        release_year: Some(2019),
        popularity: 50,
        duration_ms: 200_000,
        features: AudioFeatures {
            danceability: features[0],
            energy: features[1],
            acousticness: features[2],
            valence: features[3],
            tempo: features[4],
            instrumentalness: 0.0,
        },
    }
}
