//! Reflection Engine: `recall -> prompt -> LLM -> parse -> persist -> link`.
//!
//! Grounded on `examples/original_source/thought_wrapper/tms/reflection.py`
//! (exact cycle order, context-line format, deterministic fallback text)
//! and `tms/prompt_helpers.py` (template text). The LLM callable is modeled
//! as a boxed `Fn(&str) -> String` trait object, following the teacher's
//! single-method `Embedder: Send + Sync` capability idiom
//! (`adapter/embedding.rs`).

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{ThoughtMemoryError, ThoughtMemoryResult};
use crate::graph::ThoughtGraph;
use crate::model::{relation, ReflectionResult, Thought, ThoughtFilters};
use crate::parser::parse_structured_thoughts;
use crate::store::ThoughtStore;

/// Reflection modes, each selecting a prompt template (§6).
pub const MODES: &[&str] = &["reasoning", "summarization", "contradiction_detection", "planning"];

fn template_for(mode: &str) -> Option<&'static str> {
    match mode {
        "reasoning" => Some(
            "You are reflecting on prior reasoning. Query: {query}\n\nRecalled context:\n{context}\n\n\
             Produce 1-2 <thought category=\"reflection\" confidence=\"0.0-1.0\"> tags capturing new \
             insight or risk. Return only <thought ...> tags.",
        ),
        "summarization" => Some(
            "Summarize the recalled memory below. Query: {query}\n\nRecalled context:\n{context}\n\n\
             Produce 1-2 <thought category=\"summary\" confidence=\"0.0-1.0\"> tags. Return only \
             <thought ...> tags.",
        ),
        "contradiction_detection" => Some(
            "Check the recalled memory for contradictions relevant to the query. Query: {query}\n\n\
             Recalled context:\n{context}\n\nProduce 1-2 <thought category=\"reflection\" \
             confidence=\"0.0-1.0\"> tags. Return only <thought ...> tags.",
        ),
        "planning" => Some(
            "Plan next steps given the recalled memory. Query: {query}\n\nRecalled context:\n{context}\n\n\
             Produce 1-2 <thought category=\"plan\" confidence=\"0.0-1.0\"> tags describing concrete \
             next steps. Return only <thought ...> tags.",
        ),
        _ => None,
    }
}

fn build_reflection_prompt(mode: &str, query: &str, context: &str) -> ThoughtMemoryResult<String> {
    let template = template_for(mode)
        .ok_or_else(|| ThoughtMemoryError::UnsupportedMode(mode.to_string()))?;
    Ok(template.replace("{query}", query).replace("{context}", context))
}

/// Retrieve memory, synthesize reflections via a pluggable LLM callable,
/// and store the result atomically. Holds owning references to both the
/// store and the graph (§9 Design Notes).
pub struct ReflectionEngine {
    store: Arc<ThoughtStore>,
    graph: Option<Arc<ThoughtGraph>>,
    embedder: Arc<dyn Embedder>,
}

pub struct ReflectOptions<'a> {
    pub query: &'a str,
    pub current_session_id: &'a str,
    pub mode: &'a str,
    pub top_k: usize,
    pub reflection_session_id: Option<&'a str>,
    pub llm_callable: Option<&'a dyn Fn(&str) -> String>,
}

impl ReflectionEngine {
    pub fn new(store: Arc<ThoughtStore>, graph: Option<Arc<ThoughtGraph>>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, graph, embedder }
    }

    pub fn reflect(&self, opts: ReflectOptions) -> ThoughtMemoryResult<ReflectionResult> {
        if !MODES.contains(&opts.mode) {
            return Err(ThoughtMemoryError::UnsupportedMode(opts.mode.to_string()));
        }
        let start = Instant::now();

        let query_vector = self.embedder.embed(opts.query);

        let current_hits = self.store.semantic_search(
            &query_vector,
            &ThoughtFilters::session(opts.current_session_id),
            opts.top_k,
            0.95,
            1000,
        )?;
        let prior_hits = self.store.recall_from_prior_sessions(
            &query_vector,
            opts.current_session_id,
            self.graph.as_deref(),
            opts.top_k,
            0.95,
            if self.graph.is_some() { 1 } else { 0 },
        )?;

        let mut seen = std::collections::HashSet::new();
        let mut recalled: Vec<Thought> = Vec::new();
        for hit in current_hits.into_iter().chain(prior_hits.into_iter()) {
            if seen.insert(hit.thought.id.clone()) {
                recalled.push(hit.thought);
            }
        }
        recalled.truncate(opts.top_k.max(1));

        let context = if recalled.is_empty() {
            "- (none)".to_string()
        } else {
            recalled
                .iter()
                .map(|t| format!("- ({}/{}/{:.2}) {}", t.session_id, t.category, t.confidence, t.cleaned_text))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let prompt = build_reflection_prompt(opts.mode, opts.query, &context)?;

        let reflection_text = match opts.llm_callable {
            Some(callable) => callable(&prompt),
            None => Self::default_reflection_text(opts.mode, opts.query, &recalled),
        };

        let default_category = if opts.mode == "planning" { "plan" } else { "reflection" };
        let parsed = parse_structured_thoughts(&reflection_text, default_category, 0.9);

        let target_session = match opts.reflection_session_id {
            Some(rid) if rid != opts.current_session_id => {
                self.store.create_session(rid, Some(opts.current_session_id), None)?;
                rid.to_string()
            }
            _ => {
                self.store.create_session(opts.current_session_id, None, None)?;
                opts.current_session_id.to_string()
            }
        };

        let mut to_store = Vec::new();
        for item in &parsed {
            let vector = self.embedder.embed(&item.content);
            let thought = Thought::new(
                Some(crate::model::ThoughtId::from_string(item.thought_id.clone())),
                target_session.clone(),
                item.category.clone(),
                item.confidence,
                vec!["reflection".to_string(), opts.mode.to_string()],
                item.content.clone(),
                item.content.clone(),
                vector,
            )?;
            to_store.push(thought);
        }

        let stored = if to_store.is_empty() {
            Vec::new()
        } else {
            self.store.batch_store(to_store)?
        };

        if let Some(ref graph) = self.graph {
            for t in &stored {
                graph.add_thought(t, false, 0, None, true)?;
            }
            if let Some(first) = recalled.first() {
                let edges: Vec<_> = stored
                    .iter()
                    .map(|t| (first.id.clone(), t.id.clone(), relation::EXPLICIT_REFERENCE.to_string(), 1.0))
                    .collect();
                if !edges.is_empty() {
                    graph.link_many(&edges)?;
                }
            }
        }

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(mode = opts.mode, stored = stored.len(), latency_ms, "reflection cycle complete");

        Ok(ReflectionResult {
            reflection_text,
            prompt_used: prompt,
            recalled_thoughts: recalled,
            stored_reflections: stored,
            latency_ms,
        })
    }

    fn default_reflection_text(mode: &str, query: &str, recalled: &[Thought]) -> String {
        let (first, second) = if let Some(f) = recalled.first() {
            let s = recalled.get(1).unwrap_or(f);
            (f.cleaned_text.clone(), s.cleaned_text.clone())
        } else {
            (
                format!("No prior memory for query: {query}"),
                "Need additional evidence before confidence increases.".to_string(),
            )
        };

        match mode {
            "summarization" => format!(
                "<thought id=\"{}\" category=\"summary\" confidence=\"0.93\">Summary memory: {first}</thought>\n\
                 <thought id=\"{}\" category=\"summary\" confidence=\"0.88\">Actionable summary: {second}</thought>",
                Uuid::new_v4(),
                Uuid::new_v4()
            ),
            "contradiction_detection" => format!(
                "<thought id=\"{}\" category=\"reflection\" confidence=\"0.91\">Potential contradiction check: {first}</thought>\n\
                 <thought id=\"{}\" category=\"reflection\" confidence=\"0.86\">Reconciliation candidate: {second}</thought>",
                Uuid::new_v4(),
                Uuid::new_v4()
            ),
            "planning" => format!(
                "<thought id=\"{}\" category=\"plan\" confidence=\"0.92\">Next step: operationalize {first}</thought>\n\
                 <thought id=\"{}\" category=\"plan\" confidence=\"0.87\">Validation step: verify against {second}</thought>",
                Uuid::new_v4(),
                Uuid::new_v4()
            ),
            _ => format!(
                "<thought id=\"{}\" category=\"reflection\" confidence=\"0.94\">Reasoning check: {first}</thought>\n\
                 <thought id=\"{}\" category=\"reflection\" confidence=\"0.89\">Risk note: {second}</thought>",
                Uuid::new_v4(),
                Uuid::new_v4()
            ),
        }
    }

    pub async fn areflect(self: Arc<Self>, query: String, current_session_id: String, mode: String, top_k: usize) -> ThoughtMemoryResult<ReflectionResult> {
        tokio::task::spawn_blocking(move || {
            self.reflect(ReflectOptions {
                query: &query,
                current_session_id: &current_session_id,
                mode: &mode,
                top_k,
                reflection_session_id: None,
                llm_callable: None,
            })
        })
        .await
        .expect("areflect worker thread panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::vector_index::VectorBackendKind;

    fn thought(session: &str, text: &str, embedder: &HashEmbedder) -> Thought {
        Thought::new(None, session, "reasoning", 0.9, vec![], text, text, embedder.embed(text)).unwrap()
    }

    #[test]
    fn reflection_cycle_stores_at_least_one_reflection() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let hash_embedder = HashEmbedder::new(16);
        let store = Arc::new(ThoughtStore::open_in_memory(16, VectorBackendKind::Dense).unwrap());
        store.store(thought("s1", "initial reasoning about the launch plan", &hash_embedder)).unwrap();

        let graph = Arc::new(ThoughtGraph::new(store.clone()));
        let engine = ReflectionEngine::new(store.clone(), Some(graph), embedder);

        let result = engine
            .reflect(ReflectOptions {
                query: "launch plan",
                current_session_id: "s1",
                mode: "reasoning",
                top_k: 5,
                reflection_session_id: None,
                llm_callable: None,
            })
            .unwrap();

        assert!(!result.stored_reflections.is_empty());
        let retrieved = store.retrieve(&ThoughtFilters::default(), 10).unwrap();
        assert!(retrieved.iter().any(|t| t.category == "reflection"));
    }

    #[test]
    fn unknown_mode_is_validation_error() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let store = Arc::new(ThoughtStore::open_in_memory(16, VectorBackendKind::Dense).unwrap());
        let engine = ReflectionEngine::new(store, None, embedder);
        let err = engine.reflect(ReflectOptions {
            query: "x",
            current_session_id: "s1",
            mode: "not-a-mode",
            top_k: 5,
            reflection_session_id: None,
            llm_callable: None,
        });
        assert!(matches!(err, Err(ThoughtMemoryError::UnsupportedMode(_))));
    }
}
