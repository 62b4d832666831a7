use std::collections::BTreeMap;

use ndarray::Array1;

use crate::{
    models::UserProfile,
    services::{
        catalog::Catalog,
        ranker::{self, Ranked},
        scoring::cosine_similarity,
    },
};

/// Cosine similarity of two agents over the songs both rated, 0 when they share none
pub fn rating_similarity(a: &BTreeMap<&str, f64>, b: &BTreeMap<&str, f64>) -> f64 {
    let (left, right): (Vec<f64>, Vec<f64>) = a
        .iter()
        .filter_map(|(song, rating)| b.get(song).map(|other| (*rating, *other)))
        .unzip();

    if left.is_empty() {
        return 0.0;
    }
    cosine_similarity(Array1::from_vec(left).view(), Array1::from_vec(right).view())
}

/// User-based collaborative filtering.
///
/// Every song the target has not rated collects `rating * similarity` from each
/// other agent that rated it. Returns at most `n` catalog positions, best first.
pub fn collaborative_scores(
    target_id: &str,
    profiles: &BTreeMap<String, UserProfile>,
    catalog: &Catalog,
    n: usize,
) -> Vec<Ranked> {
    if profiles.len() < 2 {
        return Vec::new();
    }
    let Some(target) = profiles.get(target_id) else {
        return Vec::new();
    };
    let target_ratings = target.ratings();
    if target_ratings.is_empty() {
        return Vec::new();
    }

    let mut scores: BTreeMap<usize, f64> = BTreeMap::new();
    for (other_id, other) in profiles {
        if other_id == target_id {
            continue;
        }
        let other_ratings = other.ratings();
        let similarity = rating_similarity(&target_ratings, &other_ratings);
        if similarity <= 0.0 {
            continue;
        }

        for (song_id, rating) in &other_ratings {
            if target_ratings.contains_key(song_id) {
                continue;
            }
            if let Some(index) = catalog.index_of(song_id) {
                *scores.entry(index).or_insert(0.0) += rating * similarity;
            }
        }
    }

    let candidates = scores
        .into_iter()
        .map(|(index, score)| Ranked { index, score })
        .collect();
    ranker::rank(candidates, n)
}
