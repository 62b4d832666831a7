use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use rand::{seq::SliceRandom, Rng};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{parse_release_year, AudioFeatures, Song},
    services::ranker::{self, Ranked},
};

/// Columns a catalog file must provide
const REQUIRED_COLUMNS: [&str; 7] = [
    "track_id",
    "track_name",
    "danceability",
    "energy",
    "acousticness",
    "valence",
    "tempo",
];

/// Raw CSV row, matching the Spotify 30k songs dataset headers
#[derive(Debug, Deserialize)]
struct SongRecord {
    track_id: Option<String>,
    track_name: Option<String>,
    #[serde(default)]
    track_artist: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    track_popularity: Option<f64>,
    #[serde(default)]
    track_album_release_date: Option<String>,
    #[serde(default)]
    playlist_genre: Option<String>,
    #[serde(default)]
    playlist_subgenre: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    danceability: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    energy: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    acousticness: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    instrumentalness: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    valence: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    tempo: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    duration_ms: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required_feature(value: Option<f64>, name: &str) -> Result<f64, String> {
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("missing or non-numeric {}", name))
}

impl SongRecord {
    fn into_song(self) -> Result<Song, String> {
        let id = non_empty(self.track_id).ok_or("missing track_id")?;
        let name = non_empty(self.track_name).ok_or("missing track_name")?;

        let features = AudioFeatures {
            danceability: required_feature(self.danceability, "danceability")?,
            energy: required_feature(self.energy, "energy")?,
            acousticness: required_feature(self.acousticness, "acousticness")?,
            valence: required_feature(self.valence, "valence")?,
            tempo: required_feature(self.tempo, "tempo")?,
            instrumentalness: self
                .instrumentalness
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
        };

        Ok(Song {
            id,
            name,
            artist: non_empty(self.track_artist).unwrap_or_default(),
            genre: non_empty(self.playlist_genre).unwrap_or_default(),
            subgenre: non_empty(self.playlist_subgenre).unwrap_or_default(),
            release_year: self
                .track_album_release_date
                .as_deref()
                .and_then(parse_release_year),
            popularity: self
                .track_popularity
                .map(|p| p.clamp(0.0, 100.0) as u32)
                .unwrap_or(0),
            duration_ms: self.duration_ms.map(|d| d.max(0.0) as u64).unwrap_or(0),
            features,
        })
    }
}

/// A catalog row that was skipped while loading
#[derive(Debug, Clone, PartialEq)]
pub struct RowProblem {
    /// 1-based line number in the source file
    pub line: u64,
    pub reason: String,
}

/// Outcome of loading a catalog file: the usable songs plus every skipped row
#[derive(Debug)]
pub struct LoadReport {
    pub catalog: Catalog,
    pub problems: Vec<RowProblem>,
}

/// In-memory song catalog. Song ids are unique; catalog order is file order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    songs: Vec<Song>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog from already parsed songs, rejecting duplicate ids
    pub fn from_songs(songs: Vec<Song>) -> AppResult<Self> {
        let mut index = HashMap::with_capacity(songs.len());
        for (i, song) in songs.iter().enumerate() {
            if index.insert(song.id.clone(), i).is_some() {
                return Err(AppError::InvalidInput(format!(
                    "Duplicate song id {}",
                    song.id
                )));
            }
        }
        Ok(Self { songs, index })
    }

    /// Loads a catalog CSV from disk
    pub fn from_path(path: impl AsRef<Path>) -> AppResult<LoadReport> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading song catalog");
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parses catalog CSV data. Malformed rows are reported and skipped.
    pub fn from_reader<R: Read>(reader: R) -> AppResult<LoadReport> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .filter(|col| !headers.iter().any(|h| h == **col))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Catalog is missing required columns: {}",
                missing.join(", ")
            )));
        }

        let mut songs = Vec::new();
        let mut index = HashMap::new();
        let mut problems = Vec::new();

        for (offset, result) in rdr.records().enumerate() {
            let fallback_line = offset as u64 + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                    problems.push(RowProblem {
                        line,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);

            let parsed = record
                .deserialize::<SongRecord>(Some(&headers))
                .map_err(|e| e.to_string())
                .and_then(SongRecord::into_song);

            match parsed {
                Ok(song) if index.contains_key(&song.id) => problems.push(RowProblem {
                    line,
                    reason: format!("duplicate track_id {}", song.id),
                }),
                Ok(song) => {
                    index.insert(song.id.clone(), songs.len());
                    songs.push(song);
                }
                Err(reason) => problems.push(RowProblem { line, reason }),
            }
        }

        for problem in &problems {
            tracing::warn!(line = problem.line, reason = %problem.reason, "Skipping catalog row");
        }

        tracing::info!(
            songs = songs.len(),
            skipped = problems.len(),
            "Catalog loaded"
        );

        Ok(LoadReport {
            catalog: Catalog { songs, index },
            problems,
        })
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn song_at(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get_song(&self, id: &str) -> Option<&Song> {
        self.index_of(id).map(|i| &self.songs[i])
    }

    /// Top `n` songs matching `filter` by popularity, ties in catalog order
    fn most_popular<F>(&self, n: usize, filter: F) -> Vec<&Song>
    where
        F: Fn(&Song) -> bool,
    {
        let candidates = self
            .songs
            .iter()
            .enumerate()
            .filter(|(_, song)| filter(*song))
            .map(|(index, song)| Ranked {
                index,
                score: song.popularity as f64,
            })
            .collect();

        ranker::rank(candidates, n)
            .into_iter()
            .map(|r| &self.songs[r.index])
            .collect()
    }

    pub fn top_songs_by_genre(&self, genre: &str, n: usize) -> Vec<&Song> {
        self.most_popular(n, |song| song.genre == genre)
    }

    pub fn artist_top_songs(&self, artist: &str, n: usize) -> Vec<&Song> {
        self.most_popular(n, |song| song.artist == artist)
    }

    pub fn popular_songs_in_timeframe(&self, start_year: i32, end_year: i32, n: usize) -> Vec<&Song> {
        self.most_popular(n, |song| {
            song.release_year
                .map(|y| start_year <= y && y <= end_year)
                .unwrap_or(false)
        })
    }

    /// Most popular songs overall
    pub fn popular_songs(&self, n: usize) -> Vec<&Song> {
        self.most_popular(n, |_| true)
    }

    pub fn year_range(&self) -> Option<(i32, i32)> {
        let years = self.songs.iter().filter_map(|s| s.release_year);
        let (min, max) = years.fold((i32::MAX, i32::MIN), |(lo, hi), y| (lo.min(y), hi.max(y)));
        (min <= max).then_some((min, max))
    }

    /// Distinct genres in order of first appearance
    pub fn unique_genres(&self) -> Vec<&str> {
        unique(self.songs.iter().map(|s| s.genre.as_str()))
    }

    pub fn unique_artists(&self) -> Vec<&str> {
        unique(self.songs.iter().map(|s| s.artist.as_str()))
    }

    pub fn genre_distribution(&self) -> BTreeMap<String, usize> {
        let mut distribution = BTreeMap::new();
        for song in &self.songs {
            *distribution.entry(song.genre.clone()).or_insert(0) += 1;
        }
        distribution
    }

    fn sample_where<R, F>(&self, n: usize, rng: &mut R, filter: F) -> Vec<&Song>
    where
        R: Rng + ?Sized,
        F: Fn(&Song) -> bool,
    {
        let matching: Vec<&Song> = self.songs.iter().filter(|s| filter(*s)).collect();
        matching
            .choose_multiple(rng, n.min(matching.len()))
            .copied()
            .collect()
    }

    /// Random songs without replacement
    pub fn random_songs<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<&Song> {
        self.sample_where(n, rng, |_| true)
    }

    pub fn songs_by_genre<R: Rng + ?Sized>(&self, genre: &str, n: usize, rng: &mut R) -> Vec<&Song> {
        self.sample_where(n, rng, |song| song.genre == genre)
    }

    pub fn songs_by_year<R: Rng + ?Sized>(&self, year: i32, n: usize, rng: &mut R) -> Vec<&Song> {
        self.sample_where(n, rng, |song| song.release_year == Some(year))
    }

    pub fn songs_by_artist<R: Rng + ?Sized>(&self, artist: &str, n: usize, rng: &mut R) -> Vec<&Song> {
        self.sample_where(n, rng, |song| song.artist == artist)
    }

    /// Case-insensitive substring match on song name or artist
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Song> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.songs
            .iter()
            .filter(|song| {
                song.name.to_lowercase().contains(&needle)
                    || song.artist.to_lowercase().contains(&needle)
            })
            .take(limit)
            .collect()
    }

    /// Songs sharing artist, genre or era with the seed song.
    ///
    /// Score is 3 for the same artist, 2 for the same genre and 1 for a release
    /// within five years. The seed song itself is never returned.
    pub fn similar_songs_by_metadata(&self, song_id: &str, n: usize) -> AppResult<Vec<&Song>> {
        let seed_index = self
            .index_of(song_id)
            .ok_or_else(|| AppError::NotFound(format!("Song {}", song_id)))?;
        let seed = &self.songs[seed_index];

        let candidates = self
            .songs
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != seed_index)
            .map(|(index, song)| {
                let mut score = 0.0;
                if !seed.artist.is_empty() && song.artist == seed.artist {
                    score += 3.0;
                }
                if song.genre == seed.genre {
                    score += 2.0;
                }
                if song.released_near(seed.release_year, 5) {
                    score += 1.0;
                }
                Ranked { index, score }
            })
            .collect();

        Ok(ranker::rank(candidates, n)
            .into_iter()
            .map(|r| &self.songs[r.index])
            .collect())
    }
}

fn unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(*v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const HEADER: &str = "track_id,track_name,track_artist,track_popularity,track_album_release_date,playlist_genre,playlist_subgenre,danceability,energy,acousticness,instrumentalness,valence,tempo,duration_ms";

    fn csv(rows: &[&str]) -> String {
        let mut data = String::from(HEADER);
        for row in rows {
            data.push('\n');
            data.push_str(row);
        }
        data
    }

    fn sample_catalog() -> Catalog {
        let data = csv(&[
            "a,Alpha,Band A,80,2019-06-14,pop,dance pop,0.8,0.7,0.1,0.0,0.6,120.0,200000",
            "b,Beta,Band B,60,2018,rock,hard rock,0.4,0.9,0.05,0.1,0.3,140.0,180000",
            "c,Gamma,Band A,90,2001-01,pop,electropop,0.7,0.6,0.2,0.0,0.7,110.0,210000",
            "d,Delta,Band D,90,2020-02-02,rap,trap,0.9,0.6,0.1,0.0,0.5,95.0,190000",
        ]);
        Catalog::from_reader(data.as_bytes()).unwrap().catalog
    }

    #[test]
    fn test_load_valid_rows() {
        let catalog = sample_catalog();
        assert_eq!(catalog.len(), 4);
        let song = catalog.get_song("a").unwrap();
        assert_eq!(song.name, "Alpha");
        assert_eq!(song.release_year, Some(2019));
        assert_eq!(song.popularity, 80);
        assert_eq!(song.features.tempo, 120.0);
        assert_eq!(catalog.index_of("c"), Some(2));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let data = csv(&[
            "a,Alpha,Band A,80,2019,pop,,0.8,0.7,0.1,0.0,0.6,120.0,200000",
            ",NoId,Band,10,2019,pop,,0.8,0.7,0.1,0.0,0.6,120.0,200000",
            "b,Beta,Band B,60,2018,rock,,oops,0.9,0.05,0.1,0.3,140.0,180000",
            "a,Again,Band A,80,2019,pop,,0.8,0.7,0.1,0.0,0.6,120.0,200000",
            "c,Gamma,Band C,,,pop,,0.7,0.6,0.2,,0.7,110.0,",
        ]);
        let report = Catalog::from_reader(data.as_bytes()).unwrap();

        assert_eq!(report.catalog.len(), 2);
        assert_eq!(report.problems.len(), 3);
        assert_eq!(report.problems[0].line, 3);
        assert!(report.problems[1].reason.contains("danceability"));
        assert!(report.problems[2].reason.contains("duplicate"));

        let gamma = report.catalog.get_song("c").unwrap();
        assert_eq!(gamma.popularity, 0);
        assert_eq!(gamma.release_year, None);
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let data = "track_id,track_name,danceability\na,Alpha,0.5";
        let result = Catalog::from_reader(data.as_bytes());
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_ids_are_unique() {
        let catalog = sample_catalog();
        let ids: HashSet<&str> = catalog.songs().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn test_from_songs_rejects_duplicates() {
        let catalog = sample_catalog();
        let mut songs = catalog.songs().to_vec();
        songs.push(songs[0].clone());
        assert!(Catalog::from_songs(songs).is_err());
    }

    #[test]
    fn test_popularity_queries() {
        let catalog = sample_catalog();

        let pop: Vec<&str> = catalog
            .top_songs_by_genre("pop", 5)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(pop, vec!["c", "a"]);

        // c and d tie on popularity, catalog order decides
        let overall: Vec<&str> = catalog.popular_songs(2).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(overall, vec!["c", "d"]);

        let recent: Vec<&str> = catalog
            .popular_songs_in_timeframe(2018, 2020, 5)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(recent, vec!["d", "a", "b"]);

        assert_eq!(catalog.artist_top_songs("Band A", 1)[0].id, "c");
    }

    #[test]
    fn test_catalog_stats() {
        let catalog = sample_catalog();
        assert_eq!(catalog.year_range(), Some((2001, 2020)));
        assert_eq!(catalog.unique_genres(), vec!["pop", "rock", "rap"]);
        assert_eq!(catalog.unique_artists().len(), 3);
        assert_eq!(catalog.genre_distribution().get("pop"), Some(&2));
    }

    #[test]
    fn test_random_sampling_is_capped_and_seeded() {
        let catalog = sample_catalog();
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(catalog.random_songs(10, &mut rng).len(), 4);
        assert_eq!(catalog.songs_by_genre("pop", 10, &mut rng).len(), 2);
        assert!(catalog.songs_by_genre("jazz", 1, &mut rng).is_empty());
        assert_eq!(catalog.songs_by_year(2018, 3, &mut rng)[0].id, "b");
        assert_eq!(catalog.songs_by_artist("Band A", 3, &mut rng).len(), 2);

        let first: Vec<String> = catalog
            .random_songs(2, &mut StdRng::seed_from_u64(1))
            .iter()
            .map(|s| s.id.clone())
            .collect();
        let second: Vec<String> = catalog
            .random_songs(2, &mut StdRng::seed_from_u64(1))
            .iter()
            .map(|s| s.id.clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_search() {
        let catalog = sample_catalog();
        assert_eq!(catalog.search("band a", 10).len(), 2);
        assert_eq!(catalog.search("GAMMA", 10)[0].id, "c");
        assert!(catalog.search("  ", 10).is_empty());
        assert_eq!(catalog.search("a", 1).len(), 1);
    }

    #[test]
    fn test_similar_by_metadata() {
        let catalog = sample_catalog();
        let similar: Vec<&str> = catalog
            .similar_songs_by_metadata("a", 3)
            .unwrap()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        // c: same artist + genre; d: same era; b: same era
        assert_eq!(similar, vec!["c", "b", "d"]);
        assert!(matches!(
            catalog.similar_songs_by_metadata("zzz", 3),
            Err(AppError::NotFound(_))
        ));
    }
}
