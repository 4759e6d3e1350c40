//! Tolerant IdeaBlock XML codec.
//!
//! The wire dialect is produced by a text-completion model, not a
//! validating XML writer, so fragments can be preceded/followed by chatter,
//! can be left dangling (no closing tag), and use attribute-free tags. No
//! XML parsing crate is pulled in for this: it's bounded substring
//! scanning over a known small tag set, not general-purpose document
//! parsing.

use crate::block::{Entity, IdeaBlock};
use tracing::warn;

const OPEN_BLOCK: &str = "<ideablock>";
const CLOSE_BLOCK: &str = "</ideablock>";

/// Extract every well-formed `<ideablock>` fragment from `text`.
///
/// Fragments missing a required field are skipped with a logged warning
/// rather than failing the whole batch. Dangling (unterminated)
/// fragments are discarded silently — they are presumed truncated by a
/// token limit, not malformed content worth warning about.
#[must_use]
pub fn parse_blocks(text: &str) -> Vec<IdeaBlock> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN_BLOCK) {
        let after_open = &rest[start + OPEN_BLOCK.len()..];
        let Some(end) = after_open.find(CLOSE_BLOCK) else {
            break; // dangling fragment: nothing more to parse after this
        };
        let fragment = &after_open[..end];

        match parse_fragment(fragment) {
            Some(block) => blocks.push(block),
            None => warn!("dropping ideablock fragment missing required fields"),
        }

        rest = &after_open[end + CLOSE_BLOCK.len()..];
    }

    blocks
}

fn parse_fragment(fragment: &str) -> Option<IdeaBlock> {
    let name = extract_tag(fragment, "name")?;
    let critical_question = extract_tag(fragment, "critical_question")?;
    let trusted_answer = extract_tag(fragment, "trusted_answer")?;

    if name.trim().is_empty() || critical_question.trim().is_empty() || trusted_answer.trim().is_empty() {
        return None;
    }

    let tags = extract_tag(fragment, "tags")
        .map(|s| split_csv(&s))
        .unwrap_or_default();
    let keywords = extract_tag(fragment, "keywords")
        .map(|s| split_csv(&s))
        .unwrap_or_default();
    let entities = extract_entities(fragment);

    IdeaBlock::new(name, critical_question, trusted_answer, tags, keywords, entities).ok()
}

fn extract_entities(fragment: &str) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut rest = fragment;
    while let Some(start) = rest.find("<entity>") {
        let after_open = &rest[start + "<entity>".len()..];
        let Some(end) = after_open.find("</entity>") else {
            break;
        };
        let inner = &after_open[..end];
        if let (Some(entity_name), Some(entity_type)) = (
            extract_tag(inner, "entity_name"),
            extract_tag(inner, "entity_type"),
        ) {
            if !entity_name.trim().is_empty() {
                entities.push(Entity {
                    entity_name,
                    entity_type,
                });
            }
        }
        rest = &after_open[end + "</entity>".len()..];
    }
    entities
}

/// Extract the decoded text content of the first `<tag>...</tag>` in
/// `haystack`. Tolerant to surrounding whitespace inside the tag.
fn extract_tag(haystack: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = haystack.find(&open)?;
    let after_open = &haystack[start + open.len()..];
    let end = after_open.find(&close)?;
    Some(decode_entities(after_open[..end].trim()))
}

/// Split a comma-separated field (XML `<tags>`/`<keywords>`, or the
/// equivalent plain-string fields on the HTTP submission wire format)
/// into trimmed, non-empty parts.
#[must_use]
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn encode_entities(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Emit the canonical single-line XML form accepted by the external merge
/// model.
#[must_use]
pub fn emit_block(block: &IdeaBlock) -> String {
    let mut out = String::from(OPEN_BLOCK);
    out.push_str(&format!("<name>{}</name>", encode_entities(&block.name)));
    out.push_str(&format!(
        "<critical_question>{}</critical_question>",
        encode_entities(&block.critical_question)
    ));
    out.push_str(&format!(
        "<trusted_answer>{}</trusted_answer>",
        encode_entities(&block.trusted_answer)
    ));
    out.push_str(&format!(
        "<tags>{}</tags>",
        encode_entities(&block.tags.join(","))
    ));
    for entity in &block.entities {
        out.push_str("<entity>");
        out.push_str(&format!(
            "<entity_name>{}</entity_name>",
            encode_entities(&entity.entity_name)
        ));
        out.push_str(&format!(
            "<entity_type>{}</entity_type>",
            encode_entities(&entity.entity_type)
        ));
        out.push_str("</entity>");
    }
    out.push_str(&format!(
        "<keywords>{}</keywords>",
        encode_entities(&block.keywords.join(","))
    ));
    out.push_str(CLOSE_BLOCK);
    out
}
