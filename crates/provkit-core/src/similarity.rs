//! Approximate string matching compatible with Python's `difflib`.
//!
//! `ratio` is the Ratcliff/Obershelp score `2*M/T` where `M` is the number of
//! characters in matching blocks and `T` the combined length. No junk
//! heuristics are applied; tokens handled here are far below the size where
//! `difflib` would start discarding popular characters.

use std::cmp::Ordering;

pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

/// Returns up to `n` candidates scoring at least `cutoff` against `word`,
/// best first. Equal scores are ordered by the lexicographically larger
/// candidate, as `heapq.nlargest` does over `(score, candidate)` pairs.
pub fn close_matches<'a, I>(word: &str, candidates: I, n: usize, cutoff: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    if n == 0 || !(0.0..=1.0).contains(&cutoff) {
        return Vec::new();
    }

    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|candidate| (ratio(candidate, word), candidate))
        .filter(|(score, _)| *score >= cutoff)
        .collect();

    scored.sort_by(|left, right| {
        right
            .0
            .partial_cmp(&left.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| right.1.cmp(left.1))
    });

    scored
        .into_iter()
        .take(n)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        total += size;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            queue.push((i + size, ahi, j + size, bhi));
        }
    }

    total
}

// Earliest longest block in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    let mut previous = vec![0_usize; b.len() + 1];
    let mut current = vec![0_usize; b.len() + 1];

    for i in alo..ahi {
        for slot in current.iter_mut() {
            *slot = 0;
        }
        for j in blo..bhi {
            if a[i] != b[j] {
                continue;
            }
            let k = previous[j] + 1;
            current[j + 1] = k;
            if k > best_size {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_size = k;
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }

    (best_i, best_j, best_size)
}
