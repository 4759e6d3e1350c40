//! LSH candidate-pair index: reduces pair search from O(n²) to
//! roughly O(n·T) for large n via random-hyperplane locality-sensitive
//! hashing.

use model::SimilarityPair;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const DEFAULT_TABLES: usize = 10;
const DEFAULT_BITS: usize = 8;

/// Derive a deterministic 64-bit seed from a job id, so hyperplanes depend
/// on the job rather than a process-global RNG.
fn seed_from_job_id(job_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    job_id.hash(&mut hasher);
    hasher.finish()
}

/// `tables` random hyperplanes of dimension `dim`, each table holding
/// `bits` hyperplanes whose sign pattern forms that table's bucket key.
struct Table {
    hyperplanes: Vec<Vec<f32>>,
}

impl Table {
    fn new(rng: &mut StdRng, dim: usize, bits: usize) -> Self {
        let hyperplanes = (0..bits)
            .map(|_| (0..dim).map(|_| rng.sample(rand_distr_standard_normal())).collect())
            .collect();
        Self { hyperplanes }
    }

    fn bucket_key(&self, v: &[f32]) -> u32 {
        let mut key = 0u32;
        for (i, plane) in self.hyperplanes.iter().enumerate() {
            let dot: f32 = plane.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
            if dot >= 0.0 {
                key |= 1 << i;
            }
        }
        key
    }
}

// rand 0.9 dropped the old `StandardNormal` re-export convenience; this
// Box-Muller sampler avoids pulling in `rand_distr` for a single
// distribution.
fn rand_distr_standard_normal() -> impl rand::distr::Distribution<f32> {
    StandardNormalBoxMuller
}

struct StandardNormalBoxMuller;

impl rand::distr::Distribution<f32> for StandardNormalBoxMuller {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let u1: f32 = rng.random_range(f32::EPSILON..1.0);
        let u2: f32 = rng.random_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
    }
}

/// Candidate pair search over `vectors` (assumed L2-normalized), active
/// only when `vectors.len()` is at or above the caller's activation
/// threshold; this function itself works at any size.
pub struct LshIndex {
    tables: Vec<Table>,
}

impl LshIndex {
    /// Build `tables` (default 10) hash tables of `bits` (default 8)
    /// hyperplanes each, seeded deterministically from `job_id`.
    #[must_use]
    pub fn build(job_id: &str, dim: usize, tables: Option<usize>, bits: Option<usize>) -> Self {
        let tables = tables.unwrap_or(DEFAULT_TABLES);
        let bits = bits.unwrap_or(DEFAULT_BITS);
        let mut rng = StdRng::seed_from_u64(seed_from_job_id(job_id));
        let tables = (0..tables).map(|_| Table::new(&mut rng, dim, bits)).collect();
        Self { tables }
    }

    /// Candidate pairs among `vectors`, filtered to those whose cosine
    /// similarity is at least `threshold`. Pairs are emitted in sorted
    /// `(i, j)` order and deduplicated across tables.
    #[must_use]
    pub fn candidate_pairs(&self, vectors: &[Vec<f32>], threshold: f32) -> Vec<SimilarityPair> {
        let mut seen = std::collections::HashSet::new();
        let mut pairs = Vec::new();

        for table in &self.tables {
            let mut buckets: HashMap<u32, Vec<usize>> = HashMap::new();
            for (i, v) in vectors.iter().enumerate() {
                buckets.entry(table.bucket_key(v)).or_default().push(i);
            }
            for members in buckets.values() {
                for a_idx in 0..members.len() {
                    for b_idx in (a_idx + 1)..members.len() {
                        let (i, j) = (members[a_idx], members[b_idx]);
                        let key = if i < j { (i, j) } else { (j, i) };
                        if !seen.insert(key) {
                            continue;
                        }
                        let score = cosine(&vectors[i], &vectors[j]);
                        if score >= threshold {
                            pairs.push(SimilarityPair::new(i, j, score));
                        }
                    }
                }
            }
        }

        pairs.sort_by(|a, b| (a.a, a.b).cmp(&(b.a, b.b)));
        pairs
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
