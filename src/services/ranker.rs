use std::cmp::Ordering;

use serde::Serialize;

/// A catalog index paired with its score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ranked {
    pub index: usize,
    pub score: f64,
}

/// Descending by score with NaN last, then ascending by catalog index
fn by_score_desc(a: &Ranked, b: &Ranked) -> Ordering {
    let by_score = match (a.score.is_nan(), b.score.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
    };
    by_score.then_with(|| a.index.cmp(&b.index))
}

/// Sorts candidates best first and keeps at most `n`
pub fn rank(mut candidates: Vec<Ranked>, n: usize) -> Vec<Ranked> {
    candidates.sort_by(by_score_desc);
    candidates.truncate(n);
    candidates
}

/// Top `n` positions of a score slice. Ties keep catalog order.
pub fn top_n(scores: &[f64], n: usize) -> Vec<Ranked> {
    let candidates = scores
        .iter()
        .enumerate()
        .map(|(index, &score)| Ranked { index, score })
        .collect();
    rank(candidates, n)
}
