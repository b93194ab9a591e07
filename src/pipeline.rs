//! Ingestion pipeline: parse tagged output, embed each fragment, and
//! persist them atomically. Grounded on
//! `examples/original_source/thought_wrapper/tms/pipeline.py`, including its
//! exact regex-vs-linear fallback heuristic.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{ThoughtMemoryError, ThoughtMemoryResult};
use crate::model::{ParseStoreResult, Thought};
use crate::parser::{clean_thought_tags, clean_thought_tags_linear, parse_thought_tags, parse_thought_tags_linear, TagMap};
use crate::store::ThoughtStore;

pub struct ParseAndStoreOptions<'a> {
    pub session_id: &'a str,
    pub category: &'a str,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub tag_name: &'a str,
    pub linear_fallback: bool,
}

impl<'a> Default for ParseAndStoreOptions<'a> {
    fn default() -> Self {
        Self {
            session_id: "",
            category: "reasoning",
            confidence: 0.9,
            tags: Vec::new(),
            tag_name: "thought",
            linear_fallback: true,
        }
    }
}

/// Decide whether the linear (bracket-balanced) grammar should replace the
/// regex-style grammar's result: either it captured more fragments, or any
/// fragment it captured is strictly longer than the regex-style grammar's
/// same-keyed fragment (nested brackets truncated by the non-greedy match).
fn should_use_linear(regex_thoughts: &TagMap, linear_thoughts: &TagMap) -> bool {
    if linear_thoughts.len() > regex_thoughts.len() {
        return true;
    }
    for (key, linear_content) in linear_thoughts {
        let regex_content = regex_thoughts
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("");
        if linear_content.len() > regex_content.len() {
            return true;
        }
    }
    false
}

/// Parse tagged `raw_output`, embed each fragment with `embedder`, and
/// atomically persist the batch. Returns the cleaned output text alongside
/// the stored thoughts and whether the linear fallback grammar was used.
pub fn parse_and_store(
    raw_output: &str,
    store: &ThoughtStore,
    embedder: &dyn Embedder,
    opts: ParseAndStoreOptions,
) -> ThoughtMemoryResult<ParseStoreResult> {
    if opts.session_id.trim().is_empty() {
        return Err(ThoughtMemoryError::validation("session_id must be non-empty"));
    }

    let regex_thoughts = parse_thought_tags(raw_output, opts.tag_name);
    let mut thoughts_map = regex_thoughts.clone();
    let mut cleaned_output = clean_thought_tags(raw_output, opts.tag_name);
    let mut used_linear_fallback = false;

    if opts.linear_fallback {
        let linear_thoughts = parse_thought_tags_linear(raw_output, opts.tag_name);
        if should_use_linear(&regex_thoughts, &linear_thoughts) {
            thoughts_map = linear_thoughts;
            cleaned_output = clean_thought_tags_linear(raw_output, opts.tag_name);
            used_linear_fallback = true;
        }
    }

    let mut thought_objects = Vec::with_capacity(thoughts_map.len());
    for (_, content) in &thoughts_map {
        let clean_content = content.trim().to_string();
        let vector = embedder.embed(&clean_content);
        let thought = Thought::new(
            None,
            opts.session_id,
            opts.category,
            opts.confidence,
            opts.tags.clone(),
            content.clone(),
            clean_content,
            vector,
        )?;
        thought_objects.push(thought);
    }

    let stored = if thought_objects.is_empty() {
        Vec::new()
    } else {
        store.batch_store(thought_objects)?
    };

    Ok(ParseStoreResult {
        cleaned_output,
        thoughts: stored,
        used_linear_fallback,
    })
}

pub async fn aparse_and_store(
    store: Arc<ThoughtStore>,
    embedder: Arc<dyn Embedder>,
    raw_output: String,
    session_id: String,
    category: String,
    confidence: f64,
    tags: Vec<String>,
    tag_name: String,
    linear_fallback: bool,
) -> ThoughtMemoryResult<ParseStoreResult> {
    tokio::task::spawn_blocking(move || {
        parse_and_store(
            &raw_output,
            &store,
            embedder.as_ref(),
            ParseAndStoreOptions {
                session_id: &session_id,
                category: &category,
                confidence,
                tags,
                tag_name: &tag_name,
                linear_fallback,
            },
        )
    })
    .await
    .expect("aparse_and_store worker thread panicked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::vector_index::VectorBackendKind;

    #[test]
    fn spec_fragments_are_parsed_embedded_and_stored() {
        let store = ThoughtStore::open_in_memory(16, VectorBackendKind::Dense).unwrap();
        let embedder = HashEmbedder::new(16);
        let raw = "Initial analysis.\n\n/thought[The user wants a recursive solution] /thought[Edge cases include empty input] Continuing.";

        let result = parse_and_store(
            raw,
            &store,
            &embedder,
            ParseAndStoreOptions {
                session_id: "s1",
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(result.thoughts.len(), 2);
        assert!(!result.used_linear_fallback);
        assert!(!result.cleaned_output.contains("/thought["));
        assert_eq!(store.retrieve(&Default::default(), 10).unwrap().len(), 2);
    }

    #[test]
    fn nested_brackets_trigger_linear_fallback() {
        let store = ThoughtStore::open_in_memory(16, VectorBackendKind::Dense).unwrap();
        let embedder = HashEmbedder::new(16);
        let raw = "X /thought[value [with nested] tokens] Y";

        let result = parse_and_store(
            raw,
            &store,
            &embedder,
            ParseAndStoreOptions {
                session_id: "s1",
                ..Default::default()
            },
        )
        .unwrap();

        assert!(result.used_linear_fallback);
        assert_eq!(result.thoughts[0].cleaned_text, "value [with nested] tokens");
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let store = ThoughtStore::open_in_memory(16, VectorBackendKind::Dense).unwrap();
        let embedder = HashEmbedder::new(16);
        let err = parse_and_store(
            "no tags here",
            &store,
            &embedder,
            ParseAndStoreOptions::default(),
        );
        assert!(err.is_err());
    }
}
