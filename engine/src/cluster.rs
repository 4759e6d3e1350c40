//! Cluster builder: connected components below the Louvain
//! threshold, modularity-optimizing community detection at or above it.
//!
//! No community-detection crate pulls its weight for this kind of
//! small-graph clustering, so both strategies are hand-rolled here, in
//! the same spirit as the hand-rolled LSH hyperplane index.

use model::{Cluster, SimilarityPair};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap, VecDeque};

const DEFAULT_LOUVAIN_THRESHOLD: usize = 1000;

/// Build clusters over `node_count` nodes (ids `0..node_count`) connected
/// by `pairs`. Dispatches to BFS or Louvain mode by `node_count` relative
/// to `louvain_threshold` (default 1000). Singleton components/communities
/// are dropped. Node iteration order is the node id itself, so results are
/// deterministic given the same pairs.
#[must_use]
pub fn build_clusters(
    node_count: usize,
    pairs: &[SimilarityPair],
    job_id: &str,
    louvain_threshold: Option<usize>,
) -> Vec<Cluster> {
    let threshold = louvain_threshold.unwrap_or(DEFAULT_LOUVAIN_THRESHOLD);
    if node_count < threshold {
        bfs_components(node_count, pairs)
    } else {
        louvain_communities(node_count, pairs, job_id)
    }
}

fn adjacency(node_count: usize, pairs: &[SimilarityPair]) -> Vec<Vec<(usize, f32)>> {
    let mut adj = vec![Vec::new(); node_count];
    for pair in pairs {
        adj[pair.a].push((pair.b, pair.score));
        adj[pair.b].push((pair.a, pair.score));
    }
    adj
}

fn bfs_components(node_count: usize, pairs: &[SimilarityPair]) -> Vec<Cluster> {
    let adj = adjacency(node_count, pairs);
    let mut visited = vec![false; node_count];
    let mut clusters = Vec::new();

    for start in 0..node_count {
        if visited[start] {
            continue;
        }
        let mut members = std::collections::BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;

        while let Some(node) = queue.pop_front() {
            members.insert(node);
            for &(neighbor, _) in &adj[node] {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }

        if members.len() > 1 {
            clusters.push(Cluster::new(members));
        }
    }

    clusters
}

/// One-pass greedy modularity optimization (Louvain's local-moving
/// phase, without the recursive graph-contraction phases). Adequate at
/// the scale this controller targets: a single local-moving pass already
/// converges community assignments for the similarity graphs produced by
/// the candidate-pair stages.
fn louvain_communities(node_count: usize, pairs: &[SimilarityPair], job_id: &str) -> Vec<Cluster> {
    let adj = adjacency(node_count, pairs);
    let total_weight: f64 = pairs.iter().map(|p| f64::from(p.score)).sum::<f64>() * 2.0;
    if total_weight <= 0.0 {
        return Vec::new();
    }

    let degree: Vec<f64> = adj
        .iter()
        .map(|edges| edges.iter().map(|(_, w)| f64::from(*w)).sum())
        .collect();

    let mut community = vec![0usize; node_count];
    for (i, c) in community.iter_mut().enumerate() {
        *c = i;
    }
    let mut community_degree: Vec<f64> = degree.clone();

    let mut rng = StdRng::seed_from_u64(seed_from_job_id(job_id));
    let mut order: Vec<usize> = (0..node_count).collect();

    let max_passes = 10;
    for _ in 0..max_passes {
        order.shuffle(&mut rng);
        let mut moved = false;

        for &node in &order {
            let current_comm = community[node];
            community_degree[current_comm] -= degree[node];

            let mut neighbor_weights: BTreeMap<usize, f64> = BTreeMap::new();
            for &(neighbor, weight) in &adj[node] {
                if neighbor == node {
                    continue;
                }
                *neighbor_weights.entry(community[neighbor]).or_insert(0.0) += f64::from(weight);
            }

            let mut best_comm = current_comm;
            let mut best_gain = neighbor_weights.get(&current_comm).copied().unwrap_or(0.0)
                - community_degree[current_comm] * degree[node] / total_weight;

            for (&comm, &w) in &neighbor_weights {
                if comm == current_comm {
                    continue;
                }
                let gain = w - community_degree[comm] * degree[node] / total_weight;
                if gain > best_gain {
                    best_gain = gain;
                    best_comm = comm;
                }
            }

            community[node] = best_comm;
            community_degree[best_comm] += degree[node];
            if best_comm != current_comm {
                moved = true;
            }
        }

        if !moved {
            break;
        }
    }

    let mut grouped: HashMap<usize, std::collections::BTreeSet<usize>> = HashMap::new();
    for (node, &comm) in community.iter().enumerate() {
        grouped.entry(comm).or_default().insert(node);
    }

    let mut clusters: Vec<Cluster> = grouped
        .into_values()
        .filter(|members| members.len() > 1)
        .map(Cluster::new)
        .collect();
    clusters.sort_by(|a, b| a.members.iter().next().cmp(&b.members.iter().next()));
    clusters
}

fn seed_from_job_id(job_id: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    job_id.hash(&mut hasher);
    hasher.finish()
}
