//! Fast community detection over embedding vectors.
//!
//! Finds groups of vectors whose pairwise cosine similarity to a seed is at
//! least `threshold`, keeps only groups with at least `min_community_size`
//! members, and resolves overlaps greedily so every vector belongs to at most
//! one returned community.
//!
//! # Algorithm
//!
//! ```text
//! for each batch of rows:
//!     scores = cos(batch, all vectors)
//!     seed   = rows whose m-th best score >= threshold
//!     for each seed:
//!         top-k neighbours, doubling k while the k-th is still > threshold
//!         collect neighbours while score >= threshold
//! sort raw communities by size, largest first
//! accept each community minus already claimed members if still >= m
//! ```
//!
//! Returned communities are sorted by descending size. Members inside a
//! community are listed in ascending buffer position; the seed (the most
//! central point) is not kept first.

use std::cmp::{Ordering, Reverse};

use crate::embedding::{dot, normalize};

/// Tuning knobs for [`detect_communities`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommunityParams {
    /// Minimum cosine similarity between a seed and a member.
    pub threshold: f32,
    /// Communities smaller than this are dropped.
    pub min_community_size: usize,
    /// Rows scored against the full set per batch.
    pub batch_size: usize,
}

impl Default for CommunityParams {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            min_community_size: 3,
            batch_size: 1024,
        }
    }
}

/// Detect disjoint similarity communities in `embeddings`.
///
/// See the module docs for the algorithm and ordering contract.
pub fn detect_communities(embeddings: &[Vec<f32>], params: &CommunityParams) -> Vec<Vec<usize>> {
    let n = embeddings.len();
    if n == 0 {
        return Vec::new();
    }

    let threshold = params.threshold;
    let min_size = params.min_community_size.clamp(1, n);
    let batch_size = params.batch_size.max(1);
    let mut sort_max_size = (2 * min_size).max(50).min(n);

    let unit: Vec<Vec<f32>> = embeddings.iter().map(|v| normalize(v)).collect();
    let mut extracted: Vec<Vec<usize>> = Vec::new();

    for start in (0..n).step_by(batch_size) {
        let end = (start + batch_size).min(n);
        let scores: Vec<Vec<f32>> = unit[start..end]
            .iter()
            .map(|row| unit.iter().map(|other| dot(row, other)).collect())
            .collect();

        for row in &scores {
            if kth_largest(row, min_size) < threshold {
                continue;
            }

            let mut top = top_k(row, sort_max_size);
            while top.last().is_some_and(|&(_, s)| s > threshold) && sort_max_size < n {
                sort_max_size = (2 * sort_max_size).min(n);
                top = top_k(row, sort_max_size);
            }

            let community: Vec<usize> = top
                .iter()
                .take_while(|&&(_, s)| s >= threshold)
                .map(|&(idx, _)| idx)
                .collect();
            extracted.push(community);
        }
    }

    extracted.sort_by_key(|c| Reverse(c.len()));

    let mut claimed = vec![false; n];
    let mut unique: Vec<Vec<usize>> = Vec::new();
    for mut community in extracted {
        community.sort_unstable();
        let remaining: Vec<usize> = community.into_iter().filter(|&i| !claimed[i]).collect();
        if remaining.len() >= min_size {
            for &i in &remaining {
                claimed[i] = true;
            }
            unique.push(remaining);
        }
    }

    unique.sort_by_key(|c| Reverse(c.len()));
    unique
}

/// Descending by score, ties by ascending index.
fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// The `k` highest scores of `row` with their indices, best first.
fn top_k(row: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
    if k == 0 {
        return Vec::new();
    }
    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, by_score_desc);
        scored.truncate(k);
    }
    scored.sort_by(by_score_desc);
    scored
}

/// The `k`-th highest score of `row` (1-based).
fn kth_largest(row: &[f32], k: usize) -> f32 {
    let mut values = row.to_vec();
    let (_, kth, _) = values.select_nth_unstable_by(k - 1, |a, b| b.total_cmp(a));
    *kth
}
