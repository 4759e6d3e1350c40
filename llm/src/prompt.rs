//! Merge prompt construction.

use model::IdeaBlock;

const SYSTEM_PROMPT: &str = "You are a knowledge distillation assistant. You will be given several \
IdeaBlock records, each a self-contained question/answer unit with tags, entities, and keywords. \
Merge them into the smallest set of canonical IdeaBlocks that preserves every distinct fact. \
Prefer one merged block when the inputs are genuinely redundant; emit more than one only when the \
inputs cover materially different questions. Respond with one or more <ideablock> fragments in the \
same XML dialect as the input, and nothing else.";

/// Build the user-turn prompt for merging `blocks`, serialized through the
/// XML codec.
#[must_use]
pub fn build_merge_prompt(blocks: &[IdeaBlock]) -> String {
    let mut prompt = String::from("Merge the following IdeaBlocks:\n\n");
    for block in blocks {
        prompt.push_str(&model::xml::emit_block(block));
        prompt.push('\n');
    }
    prompt
}

#[must_use]
pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_every_block_as_xml() {
        let blocks = vec![
            IdeaBlock::new("A", "qa", "aa", vec![], vec![], vec![]).unwrap(),
            IdeaBlock::new("B", "qb", "ab", vec![], vec![], vec![]).unwrap(),
        ];
        let prompt = build_merge_prompt(&blocks);
        assert!(prompt.contains("<name>A</name>"));
        assert!(prompt.contains("<name>B</name>"));
    }
}
