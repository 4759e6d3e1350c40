//! Batching helper: groups working blocks needing embeddings into
//! provider-sized chunks.

use crate::client::{EmbeddingClient, EmbeddingError};
use model::WorkingBlock;
use std::env;
use tracing::info;

const DEFAULT_BATCH_SIZE: usize = 1000;

fn batch_size() -> usize {
    env::var("EMBEDDING_BATCH_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_BATCH_SIZE)
}

/// Embeds every block in `blocks` that lacks an embedding, mutating in
/// place. Blocks are chunked to `EMBEDDING_BATCH_SIZE` (default 1000)
/// texts per provider call.
///
/// # Errors
/// Returns the first embedding error encountered; already-embedded blocks
/// from prior successful chunks keep their embeddings.
pub async fn embed_missing(
    client: &dyn EmbeddingClient,
    blocks: &mut [WorkingBlock],
) -> Result<(), EmbeddingError> {
    let size = batch_size();
    let pending: Vec<usize> = blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.needs_embedding())
        .map(|(i, _)| i)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    info!(count = pending.len(), batch_size = size, "embedding pending blocks");

    for chunk in pending.chunks(size) {
        let texts: Vec<String> = chunk.iter().map(|&i| blocks[i].block.embedding_text()).collect();
        let embeddings = client.embed_batch(&texts).await?;
        for (&idx, embedding) in chunk.iter().zip(embeddings.into_iter()) {
            blocks[idx].embedding = Some(embedding);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockEmbeddingClient;
    use model::IdeaBlock;

    #[tokio::test]
    async fn embeds_only_blocks_missing_vectors() {
        let client = MockEmbeddingClient::new(4);
        let mut blocks = vec![
            WorkingBlock::from_source(IdeaBlock::new("a", "q", "aa", vec![], vec![], vec![]).unwrap()),
            WorkingBlock::from_source(IdeaBlock::new("b", "q", "bb", vec![], vec![], vec![]).unwrap()),
        ];
        blocks[0].embedding = Some(vec![9.0; 4]);

        embed_missing(&client, &mut blocks).await.unwrap();

        assert_eq!(blocks[0].embedding, Some(vec![9.0; 4]));
        assert!(blocks[1].embedding.is_some());
    }

    #[tokio::test]
    async fn no_pending_blocks_is_a_noop() {
        let client = MockEmbeddingClient::new(4);
        let mut blocks = vec![WorkingBlock::from_source(
            IdeaBlock::new("a", "q", "aa", vec![], vec![], vec![]).unwrap(),
        )];
        blocks[0].embedding = Some(vec![1.0; 4]);
        embed_missing(&client, &mut blocks).await.unwrap();
        assert_eq!(blocks[0].embedding, Some(vec![1.0; 4]));
    }
}
