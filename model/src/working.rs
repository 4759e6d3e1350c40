//! Working Block: the mutable record the engine operates on during a job.

use crate::block::IdeaBlock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a `WorkingBlock` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Source,
    Merged,
}

/// A mutable record paired with an `IdeaBlock`.
///
/// Invariant: `parents` is non-empty iff `origin == Origin::Merged`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingBlock {
    pub id: String,
    pub block: IdeaBlock,
    pub embedding: Option<Vec<f32>>,
    pub hidden: bool,
    pub origin: Origin,
    /// Direct parents only; the response assembler flattens these to source
    /// ids transitively.
    pub parents: BTreeSet<String>,
}

impl WorkingBlock {
    /// Construct a fresh source block keyed by its own content hash: no
    /// parents, not hidden, no embedding yet. Convenient for tests and any
    /// caller that doesn't have an externally-assigned id to preserve.
    #[must_use]
    pub fn from_source(block: IdeaBlock) -> Self {
        let id = block.content_hash();
        Self::from_source_with_id(id, block)
    }

    /// Construct a fresh source block keyed by a caller-supplied `id`
    /// rather than the
    /// content hash.
    ///
    /// This matters when two distinct submitted blocks share identical
    /// `name`/`critical_question`/`trusted_answer`: content-hash-as-id
    /// would collide the two into one working-set entry before
    /// clustering ever runs, silently dropping an input. Keying by the
    /// caller's id keeps both present until the iteration controller
    /// actually merges them.
    #[must_use]
    pub fn from_source_with_id(id: impl Into<String>, block: IdeaBlock) -> Self {
        Self {
            id: id.into(),
            block,
            embedding: None,
            hidden: false,
            origin: Origin::Source,
            parents: BTreeSet::new(),
        }
    }

    /// Construct a merged block with the union of its direct parents.
    #[must_use]
    pub fn from_merge(block: IdeaBlock, parents: BTreeSet<String>) -> Self {
        debug_assert!(!parents.is_empty(), "merged block must have parents");
        let id = block.content_hash();
        Self {
            id,
            block,
            embedding: None,
            hidden: false,
            origin: Origin::Merged,
            parents,
        }
    }

    #[must_use]
    pub const fn needs_embedding(&self) -> bool {
        self.embedding.is_none()
    }
}

/// Resolve every merged block's `parents` to the transitive set of source
/// ids, since a merged block is only required to store its direct
/// parents.
///
/// `all` must contain every block (visible and hidden) ever created in the
/// job, keyed by id, so that parent chains can be walked to their roots.
#[must_use]
pub fn transitive_source_parents(
    id: &str,
    all: &std::collections::HashMap<String, WorkingBlock>,
) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut stack = vec![id.to_string()];
    let mut visited = BTreeSet::new();

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        match all.get(&current) {
            Some(wb) if wb.origin == Origin::Merged => {
                for parent in &wb.parents {
                    stack.push(parent.clone());
                }
            }
            Some(_) => {
                out.insert(current);
            }
            None => {
                // Referenced id outside this snapshot: treat as a source leaf.
                out.insert(current);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(name: &str) -> WorkingBlock {
        WorkingBlock::from_source(IdeaBlock::new(name, "q", "a", vec![], vec![], vec![]).unwrap())
    }

    #[test]
    fn transitive_parents_flatten_multi_generation_merges() {
        let s1 = source("A");
        let s2 = source("B");
        let s3 = source("C");

        let mut parents_gen1 = BTreeSet::new();
        parents_gen1.insert(s1.id.clone());
        parents_gen1.insert(s2.id.clone());
        let gen1 = WorkingBlock::from_merge(
            IdeaBlock::new("AB", "q", "a", vec![], vec![], vec![]).unwrap(),
            parents_gen1,
        );

        let mut parents_gen2 = BTreeSet::new();
        parents_gen2.insert(gen1.id.clone());
        parents_gen2.insert(s3.id.clone());
        let gen2 = WorkingBlock::from_merge(
            IdeaBlock::new("ABC", "q", "a", vec![], vec![], vec![]).unwrap(),
            parents_gen2,
        );

        let mut all = HashMap::new();
        for wb in [s1.clone(), s2.clone(), s3.clone(), gen1.clone(), gen2.clone()] {
            all.insert(wb.id.clone(), wb);
        }

        let resolved = transitive_source_parents(&gen2.id, &all);
        let expected: BTreeSet<String> = [s1.id, s2.id, s3.id].into_iter().collect();
        assert_eq!(resolved, expected);
    }
}
