use std::collections::BTreeMap;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::RatingStats,
    services::{catalog::Catalog, encoder::FeatureMatrix},
};

/// Highest rating an agent can give
const MAX_RATING: f64 = 5.0;

/// Vector similarity used for content scoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    /// Mean of `1 - |a - b|` over dimensions. Only meaningful for unit-scaled features.
    InverseDistance,
}

impl SimilarityMetric {
    pub fn similarity(self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::InverseDistance => inverse_distance(a, b),
        }
    }
}

/// Cosine of the angle between two vectors, 0 when either has zero norm
pub fn cosine_similarity(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(&b) / (norm_a * norm_b)
}

fn inverse_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let total: f64 = a.iter().zip(b.iter()).map(|(x, y)| 1.0 - (x - y).abs()).sum();
    total / a.len() as f64
}

/// Genre term added on top of feature similarity
#[derive(Debug, Clone, Copy)]
pub struct GenreBonus<'a> {
    pub catalog: &'a Catalog,
    pub genre_ratings: &'a BTreeMap<String, RatingStats>,
    pub weight: f64,
}

impl GenreBonus<'_> {
    fn for_index(&self, index: usize) -> f64 {
        self.catalog
            .song_at(index)
            .and_then(|song| self.genre_ratings.get(&song.genre))
            .and_then(RatingStats::mean)
            .map(|mean| self.weight * mean / MAX_RATING)
            .unwrap_or(0.0)
    }
}

/// Scores every catalog row against a preference vector.
///
/// The result is indexed like the matrix rows.
pub fn content_scores(
    preference: &[f64],
    matrix: &FeatureMatrix,
    metric: SimilarityMetric,
    bonus: Option<&GenreBonus<'_>>,
) -> AppResult<Vec<f64>> {
    if matrix.is_empty() {
        return Err(AppError::EmptyCatalog);
    }
    if preference.len() != matrix.dimensions() {
        return Err(AppError::DimensionMismatch {
            expected: matrix.dimensions(),
            found: preference.len(),
        });
    }

    let preference = ArrayView1::from(preference);
    let scores = matrix
        .as_array()
        .rows()
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let similarity = metric.similarity(row, preference);
            similarity + bonus.map(|b| b.for_index(index)).unwrap_or(0.0)
        })
        .collect();

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::song::test_song;
    use crate::services::ranker::top_n;
    use ndarray::arr1;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        FeatureMatrix::from_rows(width, rows).unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        let a = arr1(&[1.0, 0.0]);
        let b = arr1(&[0.0, 1.0]);
        let zero = arr1(&[0.0, 0.0]);
        assert_eq!(cosine_similarity(a.view(), a.view()), 1.0);
        assert_eq!(cosine_similarity(a.view(), b.view()), 0.0);
        assert_eq!(cosine_similarity(a.view(), zero.view()), 0.0);
    }

    #[test]
    fn test_inverse_distance() {
        let a = arr1(&[1.0, 0.0]);
        let b = arr1(&[0.5, 0.0]);
        let score = SimilarityMetric::InverseDistance.similarity(a.view(), b.view());
        assert!((score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_by_cosine() {
        let matrix = matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]]);
        let scores = content_scores(&[1.0, 0.0], &matrix, SimilarityMetric::Cosine, None).unwrap();
        let top: Vec<usize> = top_n(&scores, 2).iter().map(|r| r.index).collect();
        assert_eq!(top, vec![0, 2]);
    }

    #[test]
    fn test_scoring_is_repeatable() {
        let matrix = matrix(vec![vec![0.3, 0.7], vec![0.6, 0.2], vec![0.9, 0.9]]);
        let first = content_scores(&[0.5, 0.5], &matrix, SimilarityMetric::Cosine, None).unwrap();
        let second = content_scores(&[0.5, 0.5], &matrix, SimilarityMetric::Cosine, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_errors() {
        let empty = FeatureMatrix::from_rows(2, Vec::new()).unwrap();
        assert!(matches!(
            content_scores(&[1.0, 0.0], &empty, SimilarityMetric::Cosine, None),
            Err(AppError::EmptyCatalog)
        ));

        let matrix = matrix(vec![vec![1.0, 0.0]]);
        assert!(matches!(
            content_scores(&[1.0], &matrix, SimilarityMetric::Cosine, None),
            Err(AppError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_genre_bonus() {
        let catalog = Catalog::from_songs(vec![
            test_song("a", "rock", [0.0; 5]),
            test_song("b", "jazz", [0.0; 5]),
        ])
        .unwrap();
        let matrix = matrix(vec![vec![1.0, 0.0], vec![1.0, 0.0]]);

        let mut genre_ratings = BTreeMap::new();
        genre_ratings.insert(
            "jazz".to_string(),
            RatingStats {
                total: 9.0,
                count: 2,
            },
        );
        let bonus = GenreBonus {
            catalog: &catalog,
            genre_ratings: &genre_ratings,
            weight: 1.0,
        };

        let scores =
            content_scores(&[1.0, 0.0], &matrix, SimilarityMetric::Cosine, Some(&bonus)).unwrap();
        assert_eq!(scores[0], 1.0);
        assert!((scores[1] - 1.9).abs() < 1e-12);
    }
}
