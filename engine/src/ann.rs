//! Flat inner-product ANN index over unit vectors. Cosine similarity
//! equals inner product once vectors are L2-normalized, so this is a
//! dense scan, not an approximation — adequate below the LSH activation
//! threshold.

use model::SimilarityPair;

/// Flat index built once per iteration over the currently visible block
/// set.
pub struct AnnIndex<'a> {
    vectors: &'a [Vec<f32>],
}

impl<'a> AnnIndex<'a> {
    #[must_use]
    pub fn new(vectors: &'a [Vec<f32>]) -> Self {
        Self { vectors }
    }

    /// Top-`k` nearest neighbors of `vectors[query]` by inner product,
    /// excluding the query itself.
    #[must_use]
    pub fn query(&self, query: usize, k: usize) -> Vec<(usize, f32)> {
        let q = &self.vectors[query];
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != query)
            .map(|(i, v)| (i, dot(q, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// All pairs `(i, j)` with `i < j` and similarity at least `threshold`,
    /// via a full dense scan. Used for `n < N_lsh`.
    #[must_use]
    pub fn dense_candidate_pairs(&self, threshold: f32) -> Vec<SimilarityPair> {
        let n = self.vectors.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let score = dot(&self.vectors[i], &self.vectors[j]);
                if score >= threshold {
                    pairs.push(SimilarityPair::new(i, j, score));
                }
            }
        }
        pairs
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    #[test]
    fn query_excludes_self_match() {
        let vectors = vec![unit(vec![1.0, 0.0]), unit(vec![0.9, 0.1]), unit(vec![0.0, 1.0])];
        let index = AnnIndex::new(&vectors);
        let results = index.query(0, 2);
        assert!(!results.iter().any(|(i, _)| *i == 0));
    }

    #[test]
    fn query_returns_nearest_first() {
        let vectors = vec![unit(vec![1.0, 0.0]), unit(vec![0.99, 0.01]), unit(vec![0.0, 1.0])];
        let index = AnnIndex::new(&vectors);
        let results = index.query(0, 2);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn dense_scan_filters_by_threshold() {
        let vectors = vec![unit(vec![1.0, 0.0]), unit(vec![0.99, 0.01]), unit(vec![0.0, 1.0])];
        let index = AnnIndex::new(&vectors);
        let pairs = index.dense_candidate_pairs(0.9);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].a, pairs[0].b), (0, 1));
    }
}
