//! IdeaBlock data model
//!
//! An IdeaBlock is a self-contained question/answer record with tags,
//! entities, and keywords. Its identity is derived from content, not
//! assigned, so two blocks with identical required fields always collide
//! to the same id.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// An entity mention attached to an `IdeaBlock` (name, type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_name: String,
    pub entity_type: String,
}

/// The immutable content of a single knowledge unit.
///
/// `name`, `critical_question` and `trusted_answer` are never silently
/// mutated except by the merge operation; callers that need
/// to change them must produce a new block via [`IdeaBlock::with_content`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaBlock {
    pub name: String,
    pub critical_question: String,
    pub trusted_answer: String,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub entities: Vec<Entity>,
}

impl IdeaBlock {
    /// Construct a new block, validating the required text fields are
    /// non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if `name`, `critical_question`, or `trusted_answer`
    /// is empty after trimming.
    pub fn new(
        name: impl Into<String>,
        critical_question: impl Into<String>,
        trusted_answer: impl Into<String>,
        tags: Vec<String>,
        keywords: Vec<String>,
        entities: Vec<Entity>,
    ) -> anyhow::Result<Self> {
        let name = name.into();
        let critical_question = critical_question.into();
        let trusted_answer = trusted_answer.into();

        if name.trim().is_empty() {
            anyhow::bail!("IdeaBlock.name must not be empty");
        }
        if critical_question.trim().is_empty() {
            anyhow::bail!("IdeaBlock.critical_question must not be empty");
        }
        if trusted_answer.trim().is_empty() {
            anyhow::bail!("IdeaBlock.trusted_answer must not be empty");
        }

        Ok(Self {
            name,
            critical_question,
            trusted_answer,
            tags,
            keywords,
            entities,
        })
    }

    /// Stable content-hash id: `sha256(name \x01 question \x01 answer)`, hex.
    ///
    /// The `\x01` separator prevents field-boundary collisions that plain
    /// concatenation would allow (`"ab"+"c"` vs `"a"+"bc"`).
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0x01]);
        hasher.update(self.critical_question.as_bytes());
        hasher.update([0x01]);
        hasher.update(self.trusted_answer.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Text fed to the embedding provider. Order and spacing are stable
    /// because they feed the embedding cache key.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        format!(
            "{} {} {}",
            self.name, self.critical_question, self.trusted_answer
        )
    }

    /// Returns a copy of this block with deduplicated, order-preserving
    /// tags/keywords/entities — used after an LLM merge response to avoid
    /// compounding duplicate labels across merge generations.
    #[must_use]
    pub fn deduplicated(&self) -> Self {
        let tags = dedup_preserve_order(&self.tags);
        let keywords = dedup_preserve_order(&self.keywords);
        let mut seen = HashSet::new();
        let entities = self
            .entities
            .iter()
            .filter(|e| seen.insert((e.entity_name.clone(), e.entity_type.clone())))
            .cloned()
            .collect();

        Self {
            name: self.name.clone(),
            critical_question: self.critical_question.clone(),
            trusted_answer: self.trusted_answer.clone(),
            tags,
            keywords,
            entities,
        }
    }
}

fn dedup_preserve_order(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|s| seen.insert((*s).clone()))
        .cloned()
        .collect()
}
