//! Diversity sampling inside one community.
//!
//! Picks three members that spread across the community so the template
//! oracle sees how the lines vary:
//!
//! 1. `a`: the outlier, lowest mean similarity to the other members;
//! 2. `b`: the member least similar to `a`;
//! 3. `c`: the member with the lowest mean similarity to `a` and `b`.
//!
//! Ties go to the first member in iteration order. The selection is
//! deterministic for a given similarity matrix.

use crate::embedding::similarity_matrix;

/// Number of representatives drawn from each community.
pub const SAMPLE_SIZE: usize = 3;

/// Select up to three distinct, maximally diverse member positions.
///
/// Positions index into `members`, ordered `[a, b, c]`. Communities with
/// fewer than three members are returned whole, in order.
pub fn diverse_triple(members: &[&[f32]]) -> Vec<usize> {
    let n = members.len();
    if n < SAMPLE_SIZE {
        return (0..n).collect();
    }

    let sims = similarity_matrix(members);

    let a = argmin((0..n).map(|i| {
        let others: f32 = (0..n).filter(|&j| j != i).map(|j| sims[i][j]).sum();
        (i, others / (n - 1) as f32)
    }));

    let b = argmin((0..n).filter(|&j| j != a).map(|j| (j, sims[a][j])));

    let c = argmin(
        (0..n)
            .filter(|&j| j != a && j != b)
            .map(|j| (j, (sims[j][a] + sims[j][b]) / 2.0)),
    );

    vec![a, b, c]
}

/// Position with the strictly lowest score; the first one wins ties.
fn argmin(scores: impl Iterator<Item = (usize, f32)>) -> usize {
    let mut best: Option<(usize, f32)> = None;
    for (i, score) in scores {
        match best {
            Some((_, s)) if score >= s => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i).unwrap_or(0)
}
